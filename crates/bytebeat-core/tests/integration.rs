//! Integration tests for bytebeat-core.
//!
//! Drives the renderer the way the streaming loop does: render a buffer, then
//! poll a reload watcher, then render the next one. Covers the end-to-end
//! scenarios for classic formulas, compile failures, fault containment,
//! reload atomicity, and undersampling.

use bytebeat_core::{
    CompileError, Formula, MathEnvironment, MtimeWatcher, PrecisionMode, RenderConfig, RenderMode,
    ReloadWatcher, SampleRenderer, SentinelWatcher, TimeDomain, Undersample,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn config(buffer_size: usize) -> RenderConfig {
    RenderConfig {
        buffer_size,
        ..RenderConfig::default()
    }
}

fn renderer(src: &str, config: RenderConfig) -> SampleRenderer {
    SampleRenderer::new(
        Some(Formula::compile(src).unwrap()),
        MathEnvironment::default(),
        config,
    )
}

/// Writes a formula file with an explicit modification time.
fn write_formula(path: &Path, text: &str, mtime_secs: u64) {
    std::fs::write(path, text).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .unwrap();
}

fn formula_file(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("formula.js");
    write_formula(&path, text, 1_000);
    path
}

// ============================================================================
// 1. End-to-end scenarios
// ============================================================================

#[test]
fn t_and_255_at_8000_hz() {
    let mut r = renderer("t & 255", config(10));
    assert_eq!(r.config().sample_rate, 8000);
    let mut buf = [0u8; 10];
    r.render(&mut buf);
    assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn classic_formula_matches_reference_bytes() {
    let mut r = renderer("t*(t>>5|t>>8)", config(1024));
    let mut buf = vec![0u8; 1024];
    r.render(&mut buf);
    for (t, &byte) in buf.iter().enumerate() {
        let t = t as i64;
        let expected = (t * (t >> 5 | t >> 8)) & 255;
        assert_eq!(i64::from(byte), expected, "t = {t}");
    }
}

#[test]
fn formula_with_helper_functions() {
    let src = "\
// two saws, averaged
saw = (f, phase = 0) => (t + phase) * f & 255,
mix = (a, b = a) => (a + b) / 2,
mix(saw(1), saw(2))";
    let mut r = renderer(src, config(8));
    let mut buf = [0u8; 8];
    let report = r.render(&mut buf);
    assert_eq!(report.faults, 0);
    assert_eq!(buf, [0, 1, 3, 4, 6, 7, 9, 10]);
    assert_eq!(r.formula().unwrap().function_names().count(), 2);
}

#[test]
fn bit_operations_wrap_at_32_bits() {
    let mut r = renderer("t << 24", config(4));
    let mut buf = [0u8; 4];
    r.render(&mut buf);
    // Low byte of a 32-bit left shift by 24 is always zero.
    assert_eq!(buf, [0; 4]);

    let mut r = renderer("(t * 16777216) >> 24", config(4));
    let mut buf = [0u8; 4];
    r.render(&mut buf);
    assert_eq!(buf, [0, 1, 2, 3]);
}

#[test]
fn malformed_formula_fails_with_syntax_error() {
    assert!(matches!(
        Formula::compile("t +"),
        Err(CompileError::Syntax { .. })
    ));
}

#[test]
fn malformed_reload_keeps_prior_formula() {
    let dir = TempDir::new().unwrap();
    let path = formula_file(&dir, "t & 15");
    let mut r = renderer("t & 15", config(8));
    let mut watcher = MtimeWatcher::new(&path, 8);

    let mut buf = [0u8; 8];
    r.render(&mut buf);
    write_formula(&path, "t +", 2_000);
    assert!(watcher.poll(buf.len()).is_none());

    r.render(&mut buf);
    assert_eq!(buf, [8, 9, 10, 11, 12, 13, 14, 15]);
    assert_eq!(r.formula().unwrap().source(), "t & 15");
}

#[test]
fn no_formula_yet_produces_silence_until_reload() {
    let dir = TempDir::new().unwrap();
    let path = formula_file(&dir, "t +");
    assert!(Formula::load(&path).is_err());

    let mut r = SampleRenderer::new(None, MathEnvironment::default(), config(4));
    let mut watcher = MtimeWatcher::new(&path, 4);
    let mut buf = [0u8; 4];
    for _ in 0..3 {
        r.render(&mut buf);
        assert_eq!(buf, [128; 4]);
        assert!(watcher.poll(buf.len()).is_none());
    }

    write_formula(&path, "t", 2_000);
    let formula = watcher.poll(buf.len()).unwrap();
    r.swap_formula(formula);
    r.render(&mut buf);
    assert_eq!(buf, [12, 13, 14, 15]);
}

// ============================================================================
// 2. Fault containment
// ============================================================================

#[test]
fn single_throwing_sample_is_silenced() {
    let mut r = renderer("t == 5 ? 1/0 : t", config(10));
    let mut buf = [0u8; 10];
    let report = r.render(&mut buf);
    assert_eq!(buf, [0, 1, 2, 3, 4, 128, 6, 7, 8, 9]);
    assert_eq!(report.faults, 1);
}

#[test]
fn fault_in_float_mode_is_silence() {
    let mut r = renderer("t == 2 ? 0/0 : 0.5", config(4));
    let mut buf = [1.0f32; 4];
    r.render(&mut buf);
    assert_eq!(buf, [0.5, 0.5, 0.0, 0.5]);
}

#[test]
fn float_overflow_is_silence() {
    let mut r = renderer("t == 1 ? 1e39 : -0.25", config(3));
    let mut buf = [1.0f32; 3];
    let report = r.render(&mut buf);
    assert_eq!(buf, [-0.25, 0.0, -0.25]);
    assert_eq!(report.faults, 1);
}

#[test]
fn persistent_fault_never_stalls() {
    let mut r = renderer("1/0", config(16));
    let mut buf = [0u8; 16];
    for i in 0..5u64 {
        let report = r.render(&mut buf);
        assert_eq!(report.faults, 16);
        assert_eq!(buf, [128; 16]);
        assert_eq!(r.t(), (i + 1) * 16);
    }
}

#[test]
fn recovery_lasts_exactly_one_buffer() {
    let mut r = renderer("t < 4 ? 0/0 : t", config(4));
    let mut buf = [0u8; 4];
    let modes: Vec<RenderMode> = (0..3).map(|_| r.render(&mut buf).mode).collect();
    assert_eq!(
        modes,
        [RenderMode::Normal, RenderMode::Recovering, RenderMode::Normal]
    );
}

// ============================================================================
// 3. Reload atomicity
// ============================================================================

#[test]
fn reload_takes_effect_on_next_whole_buffer() {
    let dir = TempDir::new().unwrap();
    let path = formula_file(&dir, "1");
    let mut r = SampleRenderer::new(
        Some(Formula::load(&path).unwrap()),
        MathEnvironment::default(),
        config(64),
    );
    let mut watcher = MtimeWatcher::new(&path, 64);
    let mut buf = [0u8; 64];

    r.render(&mut buf);
    // The file changes while buffer N is in flight; it is already rendered.
    write_formula(&path, "2", 2_000);
    assert!(buf.iter().all(|&b| b == 1));

    if let Some(formula) = watcher.poll(buf.len()) {
        r.swap_formula(formula);
    }
    r.render(&mut buf);
    assert!(buf.iter().all(|&b| b == 2), "buffer N+1 must use formula B entirely");
}

#[test]
fn sentinel_reload_between_buffers() {
    let dir = TempDir::new().unwrap();
    let path = formula_file(&dir, "t & 1");
    let sentinel = dir.path().join("reload");
    let mut r = SampleRenderer::new(
        Some(Formula::load(&path).unwrap()),
        MathEnvironment::default(),
        config(4),
    );
    let mut watcher = SentinelWatcher::new(&path, &sentinel, 4);
    let mut buf = [0u8; 4];

    r.render(&mut buf);
    std::fs::write(&path, "7").unwrap();
    assert!(watcher.poll(4).is_none(), "no sentinel yet");
    File::create(&sentinel).unwrap();
    r.swap_formula(watcher.poll(4).unwrap());
    r.render(&mut buf);
    assert_eq!(buf, [7; 4]);
}

// ============================================================================
// 4. Undersampling and time domains
// ============================================================================

#[test]
fn undersample_replicates_and_advances_by_factor() {
    for factor in [1u32, 2, 4, 8] {
        let undersample = Undersample::try_from(factor).unwrap();
        let cfg = RenderConfig {
            buffer_size: 32,
            undersample,
            ..RenderConfig::default()
        };
        cfg.validate().unwrap();
        let mut r = renderer("t", cfg);
        let mut buf = [0u8; 32];
        r.render(&mut buf);
        let k = factor as usize;
        for (i, &b) in buf.iter().enumerate() {
            assert_eq!(b, buf[i - i % k], "factor {k}, index {i}");
            assert_eq!(usize::from(b), i - i % k, "t seen by the formula at {i}");
        }
    }
}

#[test]
fn undersample_rejects_non_divisible_rate() {
    let cfg = RenderConfig {
        sample_rate: 11025,
        undersample: Undersample::X2,
        ..RenderConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn continuous_time_sine() {
    let cfg = RenderConfig {
        sample_rate: 8000,
        buffer_size: 8000,
        time_domain: TimeDomain::Seconds,
        ..RenderConfig::default()
    };
    let mut r = renderer("sin(TAU * 440 * t)", cfg);
    let mut buf = vec![0.0f32; 8000];
    r.render(&mut buf);
    let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.99 && peak <= 1.0);
}

#[test]
fn fast_math_renders_close_to_precise() {
    let cfg = RenderConfig {
        buffer_size: 2048,
        time_domain: TimeDomain::Seconds,
        ..RenderConfig::default()
    };
    let src = "sin(TAU * 220 * t) * 0.5";
    let mut precise = renderer(src, cfg);
    let mut fast = SampleRenderer::new(
        Some(Formula::compile(src).unwrap()),
        MathEnvironment::build(PrecisionMode::Fast, 4096).unwrap(),
        cfg,
    );
    let mut a = vec![0.0f32; 2048];
    let mut b = vec![0.0f32; 2048];
    precise.render(&mut a);
    fast.render(&mut b);
    let bound = 0.5 * std::f32::consts::TAU / 4096.0 + 1e-6;
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() <= bound, "{x} vs {y}");
    }
}

#[test]
fn fast_random_is_deterministic_across_environments() {
    let render = || {
        let mut r = SampleRenderer::new(
            Some(Formula::compile("random() * 256").unwrap()),
            MathEnvironment::build(PrecisionMode::Fast, 1024).unwrap(),
            config(256),
        );
        let mut buf = vec![0u8; 256];
        r.render(&mut buf);
        buf
    };
    assert_eq!(render(), render());
}
