use anyhow::{Context, Result, anyhow};
use log::info;
use pico_args::Arguments;
use std::{env, fs, sync::atomic::Ordering, time::Duration};

use crate::config::{ConfigState, doctor_report};
use crate::controller::{Dispatch, PullToRefresh};
use crate::input;
use crate::script::{self, Step};
use crate::settings::{FileSettings, SettingsCache, watch_file};
use crate::watch;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let profile_flag: Option<String> = pargs.opt_value_from_str("--profile")?;
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("simulate") => {
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: pullctl simulate <script> [--profile <name>]"))?;
            let cfg = load_config(profile_flag.as_deref())?;
            simulate(&cfg, &path)
        }

        Some("watch") => {
            let cfg = load_config(profile_flag.as_deref())?;
            info!("watch: profile '{}'", cfg.active_name);
            watch::run_watch(&cfg)
        }

        Some("devices") => {
            print_response(&serde_json::json!({ "devices": input::discover_touchscreens() }));
            Ok(())
        }

        Some("doctor") => {
            let cfg = load_config(profile_flag.as_deref())?;
            print_response(&doctor_report(&cfg));
            Ok(())
        }

        Some("list") => {
            let cfg = ConfigState::load_or_install_default()?;
            for name in cfg.list_profiles() {
                let mark = if name == cfg.active_name { "*" } else { " " };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: pullctl use <profile_name>"))?;
            let mut cfg = ConfigState::load_or_install_default()?;
            cfg.set_active(&name)?;
            println!("ok: active profile is now {}", cfg.active_name);
            Ok(())
        }

        Some("settings") => {
            let what: Option<String> = pargs.free_from_str().ok();
            let cfg = ConfigState::load_or_install_default()?;
            settings(&cfg, what.as_deref().unwrap_or("show"))
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn load_config(profile: Option<&str>) -> Result<ConfigState> {
    let cfg = ConfigState::load_or_install_default()?;
    match profile {
        Some(name) => cfg.with_profile(name),
        None => Ok(cfg),
    }
}

fn simulate(cfg: &ConfigState, path: &str) -> Result<()> {
    let src = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let steps = script::parse(&src).with_context(|| format!("invalid script {path}"))?;

    let mut ptr = PullToRefresh::from_profile(&cfg.profile);
    ptr.mount();
    println!(
        "profile '{}': threshold {}px, form factor {:?}",
        cfg.active_name,
        ptr.recognizer().threshold(),
        ptr.form_factor()
    );

    for rec in script::replay(&steps, &mut ptr) {
        let step = match rec.step {
            Step::Touch(ev) => format!("{:?} y={}", ev.phase, ev.y),
            Step::Scroll(off) => format!("scroll {off}"),
            Step::Viewport(vp) => format!("viewport {}x{}", vp.width, vp.height),
            Step::Container(name) => format!("container {name}"),
            Step::Settle => "settle".to_string(),
        };
        let outcome = match rec.dispatch {
            Some(Dispatch::RefreshStarted { generation, distance }) => {
                format!("refresh #{generation} started ({distance}px)")
            }
            Some(d) => format!("{d:?}"),
            None => "-".to_string(),
        };
        println!("{step:<20} {outcome:<48} {:?}", rec.state);
    }

    if ptr.is_refreshing() {
        println!("(refresh still in flight at end of script)");
    }
    Ok(())
}

fn settings(cfg: &ConfigState, what: &str) -> Result<()> {
    let mut cache = SettingsCache::new(FileSettings::new(cfg.settings_path()));
    cache.mount()?;
    match what {
        "show" => {
            print_response(&serde_json::json!({
                "path": cache.source().path(),
                "entries": cache.entries(),
            }));
        }
        "meta" => print_response(&serde_json::to_value(cache.page_meta())?),
        "public" => print_response(&serde_json::json!(cache.public_entries())),
        "watch" => {
            let stop = watch::shutdown_flag()?;
            let (_watcher, rx) = watch_file(cache.source().path())?;
            let mut last = cache.page_meta();
            print_response(&serde_json::to_value(&last)?);
            while !stop.load(Ordering::SeqCst) {
                if rx.recv_timeout(Duration::from_millis(200)).is_err() {
                    continue;
                }
                while rx.try_recv().is_ok() {}
                cache.invalidate();
                if let Err(e) = cache.ensure_fresh() {
                    log::warn!("settings reload failed; keeping last good: {e:#}");
                    continue;
                }
                let meta = cache.page_meta();
                if meta != last {
                    print_response(&serde_json::to_value(&meta)?);
                    last = meta;
                }
            }
        }
        other => return Err(anyhow!("unknown settings view: {other} (show|meta|public|watch)")),
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"pullctl — pull-to-refresh for touchscreens

USAGE:
  pullctl help [command]                  Show general or command-specific help
  pullctl simulate <script>               Replay a gesture script through the recognizer
  pullctl watch                           Recognize pulls on live touchscreen input
  pullctl devices                         List detected touchscreens
  pullctl doctor                          Diagnose permissions/devices
  pullctl list                            List profiles
  pullctl use <name>                      Switch active profile
  pullctl settings [show|meta|public|watch]
                                          Inspect the platform settings cache

OPTIONS:
  --profile <name>                        Use a profile without switching to it

TIPS:
  - Profiles: ~/.config/pullctl/profiles
  - Active profile pointer: ~/.config/pullctl/active
  - Settings: ~/.config/pullctl/settings.toml
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "simulate" => println!(
            "usage: pullctl simulate <script> [--profile <name>]\nSteps, one per line: start <y>, move <y>, end [y], scroll <offset>,\nviewport <w> <h>, container <name>, settle. '#' starts a comment."
        ),
        "watch" => println!(
            "usage: pullctl watch [--profile <name>]\nRuns the profile's refresh action when a pull crosses the threshold."
        ),
        "devices" => println!("usage: pullctl devices\nLists multitouch devices under /dev/input."),
        "doctor" => println!(
            "usage: pullctl doctor\nChecks input permissions and the active profile."
        ),
        "list" => {
            println!("usage: pullctl list\nLists available profiles; marks active with '*'.")
        }
        "use" => println!("usage: pullctl use <name>\nSwitches the active profile to <name>."),
        "settings" => println!(
            "usage: pullctl settings [show|meta|public|watch]\nshow: all entries; meta: page title/description/favicon;\npublic: public.* entries; watch: follow file changes."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
