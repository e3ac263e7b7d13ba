use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dsd_trunk_core::ids::{ChannelNumber, RadioId, Talkgroup};
use dsd_trunk_core::trunk::Grant;
use dsd_trunk_core::{Config, Published, TrunkStateMachine};

/// Replay a line-oriented event script against a fresh state machine,
/// with no radio hardware involved -- the host-side analogue of a
/// protocol simulator, for exercising the trunk state machine from a
/// script instead of a live receiver.
///
/// Script format, one event per line, blank lines and `#` comments
/// ignored:
///
/// ```text
/// cc_sync
/// grant channel=0x2001 freq=852250000 tg=1234 src=5678 dst=0 svc=0 group=1
/// sleep 200ms
/// ptt slot=0
/// sleep 2s
/// end slot=0
/// sleep 2s
/// tick
/// ```
#[derive(clap::Args, Debug)]
pub struct SimulateOpts {
    /// Path to the event script. Reads from stdin if omitted.
    script: Option<PathBuf>,
}

impl crate::ToolRun for SimulateOpts {
    fn run(&self) -> anyhow::Result<()> {
        let text = match &self.script {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                use std::io::Read;
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            }
        };

        let mut sm = TrunkStateMachine::new(Config::default()).with_hooks(
            dsd_trunk_core::hooks::HookTable::new()
                .with_tune_to_freq(|freq, _| println!("  hook: tune_to_freq({freq})"))
                .with_tune_to_cc(|freq, _| println!("  hook: tune_to_cc({freq})"))
                .with_return_to_cc(|| println!("  hook: return_to_cc()"))
                .with_flush_partial_audio(|| println!("  hook: flush_partial_audio()")),
        );

        // a UI thread would hold its own clone of `snapshot` and `load()`
        // it independently; here we just read it back after the run to
        // show the publish path is live.
        let snapshot = Arc::new(Published::new(sm.snapshot()));
        sm = sm.with_snapshot_publisher(snapshot.clone());

        let start = Instant::now();
        let mut now = start;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            run_line(&mut sm, &mut now, line)
                .map_err(|e| anyhow::anyhow!("line {}: {e}: {line:?}", lineno + 1))?;

            println!("[{:>6}ms] {line:<48} -> {:?}", now.duration_since(start).as_millis(), sm.state());
        }

        println!();
        println!("final stats: {:?}", sm.stats());
        println!("published snapshot generation: {}", snapshot.generation());
        Ok(())
    }
}

fn run_line(sm: &mut TrunkStateMachine, now: &mut Instant, line: &str) -> anyhow::Result<()> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| anyhow::anyhow!("empty line"))?;
    let args = parse_args(parts);

    match verb {
        "cc_sync" => sm.on_cc_sync(*now),
        "vc_sync" => sm.on_vc_sync(*now),
        "sync_lost" => sm.on_sync_lost(*now),
        "tdu" => sm.on_tdu(*now),
        "tick" => sm.tick(*now),
        "sleep" => *now += parse_duration(parts_first(line)?)?,
        "ptt" => sm.on_ptt(arg_i8(&args, "slot")?, *now),
        "active" => sm.on_active(arg_i8(&args, "slot")?, *now),
        "end" => sm.on_end(arg_i8(&args, "slot")?, *now),
        "idle" => sm.on_voice_idle(arg_i8(&args, "slot")?, *now),
        "neighbor_update" => {
            let freqs: anyhow::Result<Vec<u64>> = args
                .get("freqs")
                .ok_or_else(|| anyhow::anyhow!("missing freqs="))?
                .split(',')
                .map(|s| s.parse::<u64>().map_err(Into::into))
                .collect();
            sm.on_neighbor_update(&freqs?);
        }
        "enc" => sm.on_enc(
            arg_i8(&args, "slot")?,
            arg_u8(&args, "alg")?,
            arg_u16(&args, "key")?,
            Talkgroup(arg_u32(&args, "tg")?),
            *now,
        ),
        "grant" => sm.on_grant(
            Grant {
                channel: ChannelNumber(arg_u16(&args, "channel")?),
                freq_hz: arg_u64(&args, "freq")?,
                talkgroup: Talkgroup(arg_u32(&args, "tg")?),
                source: RadioId(arg_u32(&args, "src")?),
                destination: RadioId(args.get("dst").map(|s| parse_int(s)).transpose()?.unwrap_or(0) as u32),
                service_option_bits: args.get("svc").map(|s| parse_int(s)).transpose()?.unwrap_or(0) as u8,
                is_group: args.get("group").map(|s| s != "0").unwrap_or(true),
                is_data: args.get("data").map(|s| s != "0").unwrap_or(false),
            },
            *now,
        ),
        other => anyhow::bail!("unknown event {other:?}"),
    }

    Ok(())
}

fn parts_first<'a>(line: &'a str) -> anyhow::Result<&'a str> {
    line.split_whitespace().nth(1).ok_or_else(|| anyhow::anyhow!("sleep needs a duration, e.g. `sleep 200ms`"))
}

fn parse_args<'a>(parts: impl Iterator<Item = &'a str>) -> HashMap<&'a str, &'a str> {
    parts
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k, v))
        })
        .collect()
}

fn parse_int(raw: &str) -> anyhow::Result<u64> {
    if let Some(hex) = raw.strip_prefix("0x") {
        Ok(u64::from_str_radix(hex, 16)?)
    } else {
        Ok(raw.parse()?)
    }
}

fn arg_i8(args: &HashMap<&str, &str>, key: &str) -> anyhow::Result<i8> {
    let raw = args.get(key).ok_or_else(|| anyhow::anyhow!("missing {key}="))?;
    Ok(raw.parse()?)
}

fn arg_u8(args: &HashMap<&str, &str>, key: &str) -> anyhow::Result<u8> {
    let raw = args.get(key).ok_or_else(|| anyhow::anyhow!("missing {key}="))?;
    Ok(parse_int(raw)? as u8)
}

fn arg_u16(args: &HashMap<&str, &str>, key: &str) -> anyhow::Result<u16> {
    let raw = args.get(key).ok_or_else(|| anyhow::anyhow!("missing {key}="))?;
    Ok(parse_int(raw)? as u16)
}

fn arg_u32(args: &HashMap<&str, &str>, key: &str) -> anyhow::Result<u32> {
    let raw = args.get(key).ok_or_else(|| anyhow::anyhow!("missing {key}="))?;
    Ok(parse_int(raw)? as u32)
}

fn arg_u64(args: &HashMap<&str, &str>, key: &str) -> anyhow::Result<u64> {
    let raw = args.get(key).ok_or_else(|| anyhow::anyhow!("missing {key}="))?;
    parse_int(raw)
}

fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    if let Some(ms) = raw.strip_suffix("ms") {
        Ok(Duration::from_millis(ms.parse()?))
    } else if let Some(s) = raw.strip_suffix('s') {
        Ok(Duration::from_secs_f64(s.parse()?))
    } else {
        anyhow::bail!("duration must end in 'ms' or 's', got {raw:?}")
    }
}
