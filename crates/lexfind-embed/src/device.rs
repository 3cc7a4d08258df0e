use candle_core::Device;

/// CPU unless the `metal` feature is on and a GPU answers.
/// `APP_EMBED_DEVICE=cpu` pins the CPU either way.
pub fn select_device() -> Device {
    let forced_cpu = std::env::var("APP_EMBED_DEVICE").is_ok_and(|v| v.eq_ignore_ascii_case("cpu"));
    #[cfg(feature = "metal")]
    {
        if !forced_cpu {
            match Device::new_metal(0) {
                Ok(dev) => { tracing::info!(device = "metal", "embedding device selected"); return dev; }
                Err(e) => tracing::warn!(error = %e, "metal unavailable; falling back to CPU"),
            }
        }
    }
    tracing::info!(device = "cpu", forced = forced_cpu, "embedding device selected");
    Device::Cpu
}
