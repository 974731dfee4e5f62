//! Device capabilities and builder configuration.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuGen {
    Gen6,
    Gen7,
}

/// Memory-model and capability hints for the device being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub gen: GpuGen,
    /// CPU and GPU share a last-level cache, so buffers are written through
    /// a mapping instead of staged copies.
    pub has_llc: bool,
    /// The kernel keeps a persistent hardware context across batches.
    pub has_hw_context: bool,
    /// URB size in bytes.
    pub urb_size: u32,
    pub max_vs_threads: u32,
    pub max_gs_threads: u32,
    pub max_wm_threads: u32,
}

impl DeviceInfo {
    pub const fn sandybridge_gt1() -> Self {
        Self {
            gen: GpuGen::Gen6,
            has_llc: true,
            has_hw_context: true,
            urb_size: 32 * 1024,
            max_vs_threads: 24,
            max_gs_threads: 21,
            max_wm_threads: 40,
        }
    }

    pub const fn sandybridge_gt2() -> Self {
        Self {
            gen: GpuGen::Gen6,
            has_llc: true,
            has_hw_context: true,
            urb_size: 64 * 1024,
            max_vs_threads: 60,
            max_gs_threads: 60,
            max_wm_threads: 80,
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::sandybridge_gt2()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Initial batch writer size in bytes.
    pub batch_size: usize,
    /// Initial instruction writer size in bytes.
    pub instruction_size: usize,
    /// Let the batch writer grow instead of failing when full.
    pub grow_batch: bool,
    /// Keep (kind, offset, size) records of everything written.
    pub record_items: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4 * 8192,
            instruction_size: 8192,
            grow_batch: false,
            record_items: false,
        }
    }
}

impl BuilderConfig {
    pub const DEBUG_ENV: &'static str = "GPE_DEBUG";

    /// Defaults, with item recording enabled when `GPE_DEBUG` lists `batch`.
    pub fn from_env() -> Self {
        let record_items = env::var(Self::DEBUG_ENV)
            .map(|v| debug_flags_enable_batch(&v))
            .unwrap_or(false);
        Self {
            record_items,
            ..Self::default()
        }
    }
}

fn debug_flags_enable_batch(value: &str) -> bool {
    value
        .split([',', ' ', ':'])
        .any(|flag| flag.trim().eq_ignore_ascii_case("batch"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextConfig {
    pub builder: BuilderConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_parsing() {
        assert!(debug_flags_enable_batch("batch"));
        assert!(debug_flags_enable_batch("vs,batch"));
        assert!(debug_flags_enable_batch("fs BATCH"));
        assert!(!debug_flags_enable_batch("batches"));
        assert!(!debug_flags_enable_batch(""));
    }

    #[test]
    fn env_switch_turns_on_item_recording() {
        env::set_var(BuilderConfig::DEBUG_ENV, "vs,batch");
        assert!(BuilderConfig::from_env().record_items);

        env::set_var(BuilderConfig::DEBUG_ENV, "vs");
        assert!(!BuilderConfig::from_env().record_items);

        env::remove_var(BuilderConfig::DEBUG_ENV);
        assert_eq!(BuilderConfig::from_env(), BuilderConfig::default());
    }

    #[test]
    fn gt1_has_half_the_urb() {
        let (gt1, gt2) = (DeviceInfo::sandybridge_gt1(), DeviceInfo::sandybridge_gt2());
        assert_eq!(gt1.urb_size * 2, gt2.urb_size);
        assert!(gt1.max_wm_threads < gt2.max_wm_threads);
        assert_eq!(DeviceInfo::default(), gt2);
    }

    #[test]
    fn defaults_match_hardware_writer_sizes() {
        let cfg = BuilderConfig::default();
        assert_eq!(cfg.batch_size, 8192 * 4);
        assert_eq!(cfg.instruction_size, 8192);
        assert!(!cfg.grow_batch);
    }
}
