//! Touchscreen discovery (evdev 0.13.2 compatible)

use evdev::{AbsoluteAxisCode, Device, EventType};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

/// Devices reporting multitouch slots with a Y position axis.
pub fn discover_touchscreens() -> Vec<DeviceInfo> {
    let mut out = vec![];
    let Ok(rd) = std::fs::read_dir("/dev/input") else {
        return out;
    };
    for e in rd.flatten() {
        let p = e.path();
        let is_event = p
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with("event"));
        if !is_event {
            continue;
        }
        if let Ok(dev) = Device::open(&p) {
            let has_abs = dev.supported_events().contains(EventType::ABSOLUTE);
            let has_mt = dev.supported_absolute_axes().is_some_and(|a| {
                a.contains(AbsoluteAxisCode::ABS_MT_SLOT)
                    && a.contains(AbsoluteAxisCode::ABS_MT_TRACKING_ID)
                    && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_Y)
            });
            if has_abs && has_mt {
                out.push(DeviceInfo {
                    path: p.display().to_string(),
                    name: dev.name().unwrap_or("unknown").to_string(),
                });
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}
