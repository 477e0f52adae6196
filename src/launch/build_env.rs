use std::collections::BTreeMap;
use std::path::Path;

use super::{GpuVendor, HostFacts};
use crate::config::TuningProfile;

/// Open-file hard limit from which esync/fsync are worth turning on.
pub const SYNC_NOFILE_THRESHOLD: u64 = 524_288;

const PERFORMANCE: &[(&str, &str)] = &[
    ("WINE_NO_PRELOAD", "1"),
    ("WINE_SKIP_CONFIG_CHECK", "1"),
    ("LD_BIND_NOW", "1"),
    ("vblank_mode", "0"),
    ("WINE_NO_ASLR", "1"),
    ("WINE_NO_WRITE_WATCH", "1"),
    ("WINE_LARGE_ADDRESS_AWARE", "1"),
    ("WINE_ALLOW_MEDIUM_ADDRESS_AWARE", "1"),
    ("WINE_FULLSCREEN_FSR_STRENGTH", "2"),
    ("WINE_STDOUT_LINE_BUFFERED", "0"),
    ("WINE_STDERR_LINE_BUFFERED", "0"),
    ("STAGING_SHARED_MEMORY", "1"),
    ("DXVK_GPL", "1"),
    ("DXVK_ASYNC", "1"),
    ("DXVK_HUD", "compiler"),
    ("DXVK_STATE_CACHE", "1"),
    ("DXVK_FILTER_DEVICE_NAME", ""),
    ("DXVK_MAX_FRAME_LATENCY", "1"),
    ("MESA_VK_WSI_PRESENT_MODE", "immediate"),
];

const SYNC: &[(&str, &str)] = &[
    ("WINEESYNC", "1"),
    ("WINEFSYNC", "1"),
    ("WINE_SYNC_IPC", "1"),
    ("WINEPROXYSYNC", "1"),
    ("WINE_RT_PRIO", "90"),
    ("WINE_ASYNCHRONOUS_SENDMSG", "1"),
    ("PULSE_LATENCY_MSEC", "60"),
];

const NVIDIA: &[(&str, &str)] = &[
    ("__GL_MaxFramesAllowed", "1"),
    ("__GL_THREADED_OPTIMIZATIONS", "1"),
    ("__GL_SHADER_DISK_CACHE_SIZE", "1024"),
    ("__GL_SHADER_DISK_CACHE_SKIP_CLEANUP", "1"),
    ("__NV_PRIME_RENDER_OFFLOAD", "1"),
    ("__VK_LAYER_NV_optimus", "NVIDIA_only"),
];

const AMD: &[(&str, &str)] = &[
    ("mesa_glthread", "true"),
    ("RADV_PERFTEST", "gpl,sam"),
    ("AMD_DEBUG", "precompile"),
];

const INTEL: &[(&str, &str)] = &[("mesa_glthread", "true"), ("INTEL_DEBUG", "noccs")];

pub fn mono_gc_params(memory_gib: f64) -> &'static str {
    if memory_gib > 12.0 {
        "major=marksweep-conc,nursery-size=128m,soft-heap-limit=1g"
    } else if memory_gib >= 4.0 {
        "major=marksweep-conc,nursery-size=64m,soft-heap-limit=512m"
    } else {
        "nursery-size=16m,soft-heap-limit=128m"
    }
}

/// Whether the launched process should get its open-file limit raised and
/// the sync keys set.
pub fn sync_enabled(facts: &HostFacts, profile: TuningProfile) -> bool {
    profile == TuningProfile::Performance
        && facts
            .nofile_hard_limit
            .is_some_and(|hard| hard >= SYNC_NOFILE_THRESHOLD)
}

fn extend(env: &mut BTreeMap<String, String>, pairs: &[(&str, &str)]) {
    for (key, value) in pairs {
        env.insert(key.to_string(), value.to_string());
    }
}

/**
 * The complete environment for a session against `prefix`.
 *
 * Pure: the ambient environment is an input, never read or modified here.
 * The runtime's own debug channels stay on `err` so missing-library errors
 * reach the output scanner.
 */
pub fn build_env(
    ambient: &BTreeMap<String, String>,
    prefix: &Path,
    facts: &HostFacts,
    profile: TuningProfile,
) -> BTreeMap<String, String> {
    let mut env = ambient.clone();
    extend(&mut env, &[("WINEUPDATE", "0"), ("WINEDEBUG", "-all,err+all")]);

    if profile == TuningProfile::Performance {
        extend(&mut env, PERFORMANCE);
        extend(
            &mut env,
            &[("MONO_GC_PARAMS", mono_gc_params(facts.memory_gib))],
        );
        if sync_enabled(facts, profile) {
            extend(&mut env, SYNC);
        }
        for vendor in &facts.gpu_vendors {
            extend(
                &mut env,
                match vendor {
                    GpuVendor::Nvidia => NVIDIA,
                    GpuVendor::Amd => AMD,
                    GpuVendor::Intel => INTEL,
                },
            );
        }
    }

    env.insert("WINEPREFIX".to_string(), prefix.display().to_string());
    env
}
