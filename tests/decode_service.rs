//! End-to-end decode runs against fake `atest` scripts.
#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use hirogari_decoder::{
    BlockAnomaly, DecodeRequest, DecodeService, Degradation, Error, Invoker, Opts, ProcessFailure,
    ReportParser,
};
use tokio::sync::Mutex;

use common::{process_is_running, read_pid, wait_until};

// Writing an executable while another test forks can fail the exec with ETXTBSY.
static SPAWN_LOCK: Mutex<()> = Mutex::const_new(());

const REPORT: &str = "\
Amount of audio data processed: 1.2 seconds.
DECODED[1] 0:01.234 JQ1YCZ audio level = 52(10/9)
[0] JQ1YCZ>CQ:Hello!
------
U frame UI: p/f=0, No layer 3 protocol implemented., length = 22
 dest    CQ      0 c/r=1 res=3 last=0
 source  JQ1YCZ  0 c/r=0 res=3 last=1
  000:  86 a2 40 40 40 40 e0 94 a2 62 b2 86 b4 61 03 f0  ..@@@@...b...a..
  010:  48 65 6c 6c 6f 21                                Hello!
";

struct Fixture {
    dir: tempfile::TempDir,
    recording: PathBuf,
}

impl Fixture {
    fn new() -> anyhow::Result<Self> {
        // The system temp dir may be mounted noexec.
        let dir = tempfile::Builder::new()
            .prefix("hirogari-")
            .tempdir_in(env!("CARGO_TARGET_TMPDIR"))?;
        let recording = dir.path().join("pass.wav");
        std::fs::write(&recording, b"RIFF")?;
        Ok(Self { dir, recording })
    }

    /// Install an executable shell script named `name` and return its path.
    fn script(&self, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    fn report_file(&self, report: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join("report.txt");
        std::fs::write(&path, report)?;
        Ok(path)
    }

    fn service(&self, program: &Path, timeout: Option<Duration>) -> anyhow::Result<DecodeService> {
        let opts = Opts {
            program: Some(program.to_path_buf()),
            working_dir: None,
            timeout,
        };
        Ok(DecodeService::with_parts(
            Invoker::for_os(opts, "linux")?,
            ReportParser::default(),
        ))
    }
}

#[tokio::test]
async fn decodes_payload_columns_from_engine_report() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let report = fx.report_file(REPORT)?;
    let program = fx.script("atest", &format!("cat '{}'", report.display()))?;

    let decoded = fx
        .service(&program, Some(Duration::from_secs(10)))?
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    // Column 0 is the indent, column 1 the offset, column 2 the hex bytes.
    assert_eq!(
        decoded.text(),
        "86a240404040e094a262b286b46103f048656c6c6f21\n"
    );
    assert!(!decoded.is_degraded());
    Ok(())
}

#[tokio::test]
async fn passes_baud_rate_and_path_through() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let args = fx.dir.path().join("args.txt");
    let program = fx.script(
        "atest",
        &format!("printf '%s ' \"$@\" > '{}'", args.display()),
    )?;

    let decoded = fx
        .service(&program, None)?
        .decode_result(Some("ax25"), fx.recording.to_str(), Some("9600"))
        .await?;

    assert_eq!(decoded.text(), "");
    assert!(!decoded.is_degraded());
    let recorded = std::fs::read_to_string(&args)?;
    assert_eq!(
        recorded.trim_end(),
        format!("-B 9600 -h {}", fx.recording.display())
    );
    Ok(())
}

#[tokio::test]
async fn stderr_is_part_of_the_report() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let report = fx.report_file("DECODED ------\nh1\nh2\nh3\nA  B  0102  tail\n")?;
    let program = fx.script("atest", &format!("cat '{}' >&2", report.display()))?;

    let decoded = fx
        .service(&program, None)?
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    assert_eq!(decoded.text(), "0102\n");
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_yields_empty_result() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let report = fx.report_file(REPORT)?;
    let program = fx.script("atest", &format!("cat '{}'\nexit 3", report.display()))?;

    let decoded = fx
        .service(&program, None)?
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    assert_eq!(decoded.text(), "");
    assert!(decoded.process_failed());
    assert_eq!(
        decoded.degradations,
        vec![Degradation::Process(ProcessFailure::Exit { code: Some(3) })]
    );
    Ok(())
}

#[tokio::test]
async fn hanging_engine_is_killed_at_the_deadline() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let pid_file = fx.dir.path().join("atest.pid");
    let program = fx.script(
        "atest",
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    )?;

    let started = Instant::now();
    let decoded = fx
        .service(&program, Some(Duration::from_millis(200)))?
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(decoded.text(), "");
    assert_eq!(
        decoded.degradations,
        vec![Degradation::Process(ProcessFailure::TimedOut { after_ms: 200 })]
    );

    let pid = read_pid(&pid_file).unwrap_or_default();
    assert!(!pid.is_empty(), "engine never started");
    assert!(
        wait_until(Duration::from_secs(5), || !process_is_running(&pid)),
        "engine process {pid} survived the deadline"
    );
    Ok(())
}

#[tokio::test]
async fn undecodable_output_bytes_are_dropped() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let program = fx.script(
        "atest",
        r"printf 'DEC\377ODED ------\nh1\nh2\nh3\nA  B  C\376D\n'",
    )?;

    let decoded = fx
        .service(&program, None)?
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    assert_eq!(decoded.text(), "CD\n");
    Ok(())
}

#[tokio::test]
async fn malformed_blocks_degrade_without_failing() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let report = fx.report_file(
        "noise DECODED pkt1 ------ h1\nh2\nh3\nAA  BB  CC\nDD  EE  FF\n DECODED pkt2 ------ h1\nh2\nh3\n",
    )?;
    let program = fx.script("atest", &format!("cat '{}'", report.display()))?;

    let decoded = fx
        .service(&program, None)?
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    assert_eq!(decoded.text(), "CCFF\n\n");
    assert!(!decoded.process_failed());
    let too_short = Degradation::Block(BlockAnomaly::TooShort { block: 1, lines: 3 });
    assert!(decoded.degradations.contains(&too_short));
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn default_invocation_runs_atest_from_the_working_dir() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let report = fx.report_file("DECODED ------\nh1\nh2\nh3\nA  B  42\n")?;
    fx.script("atest", &format!("cat '{}'", report.display()))?;

    let opts = Opts {
        program: None,
        working_dir: Some(fx.dir.path().to_path_buf()),
        timeout: Some(Duration::from_secs(10)),
    };
    let service = DecodeService::with_parts(Invoker::new(opts)?, ReportParser::default());
    let decoded = service
        .decode(&DecodeRequest::new(&fx.recording, "1200"))
        .await?;

    assert_eq!(decoded.text(), "42\n");
    Ok(())
}

#[tokio::test]
async fn missing_recording_is_reported_as_not_found() -> anyhow::Result<()> {
    let _guard = SPAWN_LOCK.lock().await;
    let fx = Fixture::new()?;
    let marker = fx.dir.path().join("spawned");
    let program = fx.script("atest", &format!("touch '{}'", marker.display()))?;

    let err = fx
        .service(&program, None)?
        .decode(&DecodeRequest::new(
            fx.dir.path().join("missing.wav"),
            "1200",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound));
    assert!(!marker.exists());
    Ok(())
}
