use gpe_protocol::decode::command_names;
use gpe_protocol::gen6::{self, Command};
use gpe_protocol::{decode_batch, DecodeError, PipeControl};
use pretty_assertions::assert_eq;

fn push_packet(out: &mut Vec<u8>, cmd: Command, body: &[u32]) {
    let len = 1 + body.len();
    out.extend_from_slice(&cmd.dw0(len).to_le_bytes());
    for dw in body {
        out.extend_from_slice(&dw.to_le_bytes());
    }
}

#[test]
fn walks_mixed_batch_by_header_length() {
    let mut bytes = Vec::new();
    push_packet(&mut bytes, Command::PipelineSelect, &[]);
    push_packet(&mut bytes, Command::StateBaseAddress, &[1; 9]);
    push_packet(
        &mut bytes,
        Command::PipeControl,
        &[PipeControl::CS_STALL.bits(), 0, 0, 0],
    );
    // Vertex buffers is variable length: two buffers.
    push_packet(&mut bytes, Command::VertexBuffers, &[0; 8]);
    push_packet(&mut bytes, Command::Primitive, &[3, 0, 0, 1, 0]);
    push_packet(&mut bytes, Command::MiBatchBufferEnd, &[]);
    push_packet(&mut bytes, Command::MiNoop, &[]);

    let packets = decode_batch(&bytes).unwrap();
    assert_eq!(
        command_names(&packets),
        vec![
            "PIPELINE_SELECT",
            "STATE_BASE_ADDRESS",
            "PIPE_CONTROL",
            "3DSTATE_VERTEX_BUFFERS",
            "3DPRIMITIVE",
            "MI_BATCH_BUFFER_END",
        ]
    );

    assert_eq!(packets[1].offset_dw, 1);
    assert_eq!(packets[2].dw(1), PipeControl::CS_STALL.bits());
    assert_eq!(packets[3].dwords.len(), 9);
    assert_eq!(packets[4].offset_dw, 1 + 10 + 5 + 9);
    assert_eq!(packets[4].dw(1), 3);
}

#[test]
fn unknown_header_is_reported_with_offset() {
    let mut bytes = Vec::new();
    push_packet(&mut bytes, Command::MiNoop, &[]);
    bytes.extend_from_slice(&0x7fff_0000u32.to_le_bytes());

    assert_eq!(
        decode_batch(&bytes),
        Err(DecodeError::UnknownCommand {
            offset: 1,
            dw0: 0x7fff_0000
        })
    );
}

#[test]
fn max_lengths_fit_the_length_field() {
    for cmd in Command::ALL {
        if cmd.is_single_dword() {
            continue;
        }
        let mask = if cmd.is_mi() {
            gen6::MI_LENGTH_MASK
        } else {
            gen6::RENDER_LENGTH_MASK
        };
        assert!(
            (cmd.size_dw() - 2) as u32 <= mask,
            "{} does not fit its length field",
            cmd.name()
        );
    }
}
