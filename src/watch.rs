use anyhow::{Result, anyhow};
use log::{error, info, warn};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};

use crate::config::ConfigState;
use crate::controller::{Dispatch, PullToRefresh};
use crate::input;
use crate::settings::watch_file;
use crate::tracker::ContactTracker;

pub fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let f = flag.clone();
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("received signal {sig}; shutting down");
            f.store(true, Ordering::SeqCst);
        }
    });
    Ok(flag)
}

pub fn run_watch(cfg: &ConfigState) -> Result<()> {
    let profile = &cfg.profile;
    let mut devs: Vec<(Device, ContactTracker)> = vec![];
    for d in input::discover_touchscreens() {
        match Device::open(&d.path) {
            Ok(dev) => {
                if let Err(e) = dev.set_nonblocking(true) {
                    warn!("{}: cannot set non-blocking: {e}", d.path);
                    continue;
                }
                info!("watching {} ({})", d.name, d.path);
                // slot numbers are per device
                let mut tracker = ContactTracker::new(profile.viewport.height);
                tracker.set_y_range(profile.device.y_raw_min, profile.device.y_raw_max);
                devs.push((dev, tracker));
            }
            Err(e) => warn!("failed to open {}: {e}", d.path),
        }
    }
    if devs.is_empty() {
        return Err(anyhow!(
            "no readable touchscreen found under /dev/input (try `pullctl doctor`)"
        ));
    }

    let stop = shutdown_flag()?;

    let profile_path = cfg.profiles_dir.join(format!("{}.toml", cfg.active_name));
    let profile_watch = match watch_file(&profile_path) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile changes will not be picked up: {e:#}");
            None
        }
    };

    let mut ptr = PullToRefresh::from_profile(profile);
    ptr.mount();
    if !ptr.is_listening() {
        warn!("form factor is {:?}; pull-to-refresh stays inactive", ptr.form_factor());
    }

    while !stop.load(Ordering::SeqCst) {
        let mut any_event = false;

        for (dev, tracker) in devs.iter_mut() {
            let Ok(events) = dev.fetch_events() else {
                continue;
            };
            for ev in events {
                any_event = true;
                if ev.event_type() == EventType::ABSOLUTE {
                    match ev.code() {
                        c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => tracker.on_slot(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                            tracker.on_tracking_id(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                            tracker.on_pos_y(ev.value())
                        }
                        _ => {}
                    }
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    if let Some(touch) = tracker.on_syn_report() {
                        match ptr.handle(touch) {
                            Dispatch::Released { distance } => {
                                info!("released at {distance:.0}px; below threshold")
                            }
                            other => log::trace!("{touch:?} -> {other:?}"),
                        }
                    }
                }
            }
        }

        if let Some((_, rx)) = &profile_watch {
            if rx.try_recv().is_ok() {
                while rx.try_recv().is_ok() {}
                match cfg.clone().with_profile(&cfg.active_name) {
                    Ok(next) => {
                        ptr.set_action(next.profile.refresh_action());
                        info!("profile '{}' reloaded; refresh action updated", cfg.active_name);
                    }
                    Err(e) => error!("profile reload failed; keeping last good: {e:#}"),
                }
            }
        }

        ptr.poll();

        if !any_event {
            thread::sleep(Duration::from_millis(4));
        }
    }

    ptr.unmount();
    if ptr.is_refreshing() {
        info!("exiting with a refresh still in flight");
    }
    Ok(())
}
