//! Math capabilities available to formulas.
//!
//! Two interchangeable implementations sit behind [`MathFunctions`]:
//!
//! | Variant | sin/cos/tan | pow(2, x) | random |
//! |---------|-------------|-----------|--------|
//! | [`PreciseMath`] | `f64` transcendentals | `exp2` | OS-seeded `StdRng` |
//! | [`FastMath`] | `f32` lookup table, `N` entries | 512-entry semitone cache | xorshift32, fixed seed |
//!
//! The choice is made once at startup through [`MathEnvironment::build`] and
//! never changes for the lifetime of the process.
//!
//! # Fast-math accuracy
//!
//! Table lookups are piecewise constant: the index is
//! `floor(x · N / 2π) & (N − 1)`, so the angular resolution is `2π / N` and
//! `|fast_sin(x) − sin(x)| ≤ 2π / N` while `|x · N / 2π|` stays below about
//! 2^40. Past that the rounded product drifts off the true table slot. From
//! 2^53 on its low bits carry no angle information at all, and beyond the
//! `i64` range the cast saturates to the last slot.
//!
//! | Table size | Resolution (rad) |
//! |------------|------------------|
//! | 512 | 0.01227 |
//! | 1024 (default) | 0.00614 |
//! | 4096 | 0.00153 |
//!
//! `tan` shares the index but has poles, so only sin/cos carry the bound.

use crate::error::ConfigurationError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

/// Default number of entries in each fast-math trig table.
pub const DEFAULT_TABLE_SIZE: usize = 1024;

/// Smallest accepted trig table size.
pub const MIN_TABLE_SIZE: usize = 16;

/// Entries in the pow2 cache.
pub const POW2_CACHE_SIZE: usize = 512;

/// Cache index of 2^0. Entries span `[-256/12, 255/12]` in semitone steps.
const POW2_CACHE_ZERO: f64 = 256.0;

/// Initial xorshift32 state for the fast generator.
pub const XORSHIFT_SEED: u32 = 2_463_534_242;

/// `1 / 2^32`: maps a `u32` onto `[0, 1)`.
const U32_TO_UNIT: f64 = 2.328_306_436_538_696_3e-10;

/// Numeric precision of the math capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrecisionMode {
    /// Direct transcendental calls.
    #[default]
    Precise,
    /// Lookup tables and a cheap PRNG.
    Fast,
}

/// A named function callable from formulas.
///
/// Declaration order is the fixed capability list bound by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `sin(x)`
    Sin,
    /// `cos(x)`
    Cos,
    /// `tan(x)`
    Tan,
    /// `random()` in `[0, 1)`
    Random,
    /// `sqrt(x)`
    Sqrt,
    /// `abs(x)`
    Abs,
    /// `floor(x)`
    Floor,
    /// `log(x)`, natural logarithm
    Log,
    /// `exp(x)`
    Exp,
    /// `pow(base, exp)`
    Pow,
    /// `ceil(x)`
    Ceil,
    /// `round(x)`, half toward +∞
    Round,
    /// `pow2(x)` = 2^x
    Pow2,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
    /// `tanh(x)`
    Tanh,
}

impl Builtin {
    /// Every capability, in binding order.
    pub const ALL: [Builtin; 16] = [
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Random,
        Builtin::Sqrt,
        Builtin::Abs,
        Builtin::Floor,
        Builtin::Log,
        Builtin::Exp,
        Builtin::Pow,
        Builtin::Ceil,
        Builtin::Round,
        Builtin::Pow2,
        Builtin::Min,
        Builtin::Max,
        Builtin::Tanh,
    ];

    /// Name as written in formulas.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Random => "random",
            Builtin::Sqrt => "sqrt",
            Builtin::Abs => "abs",
            Builtin::Floor => "floor",
            Builtin::Log => "log",
            Builtin::Exp => "exp",
            Builtin::Pow => "pow",
            Builtin::Ceil => "ceil",
            Builtin::Round => "round",
            Builtin::Pow2 => "pow2",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Tanh => "tanh",
        }
    }

    /// Number of arguments the capability takes.
    pub fn arity(self) -> usize {
        match self {
            Builtin::Random => 0,
            Builtin::Pow | Builtin::Min | Builtin::Max => 2,
            _ => 1,
        }
    }

    /// Looks up a capability by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// The capability set a formula is evaluated against.
///
/// Functions that are identical in every precision mode have default
/// implementations; variants override the ones they approximate.
pub trait MathFunctions {
    /// Sine of `x` radians.
    fn sin(&self, x: f64) -> f64;

    /// Cosine of `x` radians.
    fn cos(&self, x: f64) -> f64;

    /// Tangent of `x` radians.
    fn tan(&self, x: f64) -> f64;

    /// `2^x`.
    fn pow2(&self, x: f64) -> f64;

    /// Uniform value in `[0, 1)`. Advances the generator state.
    fn random(&mut self) -> f64;

    /// Precision mode of this implementation.
    fn mode(&self) -> PrecisionMode;

    /// `base^exp`. Base-2 powers go through [`pow2`](Self::pow2).
    fn pow(&self, base: f64, exp: f64) -> f64 {
        if base == 2.0 {
            self.pow2(exp)
        } else {
            base.powf(exp)
        }
    }

    /// Dispatches a resolved capability. `args` holds at least `f.arity()` values.
    #[inline]
    fn apply(&mut self, f: Builtin, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(f64::NAN);
        let b = args.get(1).copied().unwrap_or(f64::NAN);
        match f {
            Builtin::Sin => self.sin(a),
            Builtin::Cos => self.cos(a),
            Builtin::Tan => self.tan(a),
            Builtin::Random => self.random(),
            Builtin::Sqrt => a.sqrt(),
            Builtin::Abs => a.abs(),
            Builtin::Floor => a.floor(),
            Builtin::Log => a.ln(),
            Builtin::Exp => a.exp(),
            Builtin::Pow => self.pow(a, b),
            Builtin::Ceil => a.ceil(),
            Builtin::Round => (a + 0.5).floor(),
            Builtin::Pow2 => self.pow2(a),
            Builtin::Min => js_min(a, b),
            Builtin::Max => js_max(a, b),
            Builtin::Tanh => a.tanh(),
        }
    }
}

// NaN-propagating, unlike f64::min/max.
fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

/// Full-precision capabilities.
#[derive(Debug, Clone)]
pub struct PreciseMath {
    rng: StdRng,
}

impl PreciseMath {
    /// Creates the precise set with an OS-seeded generator.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Creates the precise set with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for PreciseMath {
    fn default() -> Self {
        Self::new()
    }
}

impl MathFunctions for PreciseMath {
    fn sin(&self, x: f64) -> f64 {
        x.sin()
    }

    fn cos(&self, x: f64) -> f64 {
        x.cos()
    }

    fn tan(&self, x: f64) -> f64 {
        x.tan()
    }

    fn pow2(&self, x: f64) -> f64 {
        x.exp2()
    }

    fn random(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn mode(&self) -> PrecisionMode {
        PrecisionMode::Precise
    }
}

/// Xorshift32 generator.
///
/// Deterministic for a given seed. A zero seed would lock the state at zero,
/// so it is replaced with [`XORSHIFT_SEED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    /// Creates a generator from a seed.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { XORSHIFT_SEED } else { seed },
        }
    }

    /// Advances the state and returns it.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Next value in `[0, 1)`.
    #[inline]
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.next_u32()) * U32_TO_UNIT
    }
}

impl Default for Xorshift32 {
    fn default() -> Self {
        Self::new(XORSHIFT_SEED)
    }
}

/// Lookup-table capabilities.
///
/// Tables are built once at construction. Lookups are branch-free: the index
/// is masked into range, so any finite or non-finite input hits a valid entry.
#[derive(Debug, Clone)]
pub struct FastMath {
    sin_table: Box<[f32]>,
    cos_table: Box<[f32]>,
    tan_table: Box<[f32]>,
    mask: i64,
    scale: f64,
    pow2_cache: Box<[f32]>,
    rng: Xorshift32,
}

impl FastMath {
    /// Builds tables with `table_size` entries per function.
    ///
    /// `table_size` must be a power of two and at least [`MIN_TABLE_SIZE`].
    pub fn new(table_size: usize) -> Result<Self, ConfigurationError> {
        if table_size < MIN_TABLE_SIZE || !table_size.is_power_of_two() {
            return Err(ConfigurationError::InvalidTableSize(table_size));
        }

        let angle = |i: usize| i as f64 / table_size as f64 * TAU;
        let build = |f: fn(f64) -> f64| -> Box<[f32]> {
            (0..table_size).map(|i| f(angle(i)) as f32).collect()
        };

        let pow2_cache = (0..POW2_CACHE_SIZE)
            .map(|i| ((i as f64 - POW2_CACHE_ZERO) / 12.0).exp2() as f32)
            .collect();

        Ok(Self {
            sin_table: build(f64::sin),
            cos_table: build(f64::cos),
            tan_table: build(f64::tan),
            mask: table_size as i64 - 1,
            scale: table_size as f64 / TAU,
            pow2_cache,
            rng: Xorshift32::default(),
        })
    }

    /// Replaces the generator seed. Only meaningful before rendering starts.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.rng = Xorshift32::new(seed);
        self
    }

    /// Entries per trig table.
    pub fn table_size(&self) -> usize {
        self.sin_table.len()
    }

    /// Angular step between adjacent table entries, in radians.
    pub fn resolution(&self) -> f64 {
        TAU / self.table_size() as f64
    }

    #[inline]
    fn index(&self, x: f64) -> usize {
        // Saturating float→int cast; NaN maps to 0.
        ((x * self.scale).floor() as i64 & self.mask) as usize
    }
}

impl MathFunctions for FastMath {
    #[inline]
    fn sin(&self, x: f64) -> f64 {
        f64::from(self.sin_table[self.index(x)])
    }

    #[inline]
    fn cos(&self, x: f64) -> f64 {
        f64::from(self.cos_table[self.index(x)])
    }

    #[inline]
    fn tan(&self, x: f64) -> f64 {
        f64::from(self.tan_table[self.index(x)])
    }

    #[inline]
    fn pow2(&self, x: f64) -> f64 {
        let idx = (x * 12.0 + POW2_CACHE_ZERO).floor();
        if idx >= 0.0 && idx < POW2_CACHE_SIZE as f64 {
            f64::from(self.pow2_cache[idx as usize])
        } else {
            x.exp2()
        }
    }

    #[inline]
    fn random(&mut self) -> f64 {
        self.rng.next_unit()
    }

    fn mode(&self) -> PrecisionMode {
        PrecisionMode::Fast
    }
}

/// The active capability set, selected once at startup.
#[derive(Debug, Clone)]
pub enum MathEnvironment {
    /// Full precision.
    Precise(PreciseMath),
    /// Lookup tables.
    Fast(FastMath),
}

impl MathEnvironment {
    /// Builds the environment for a precision mode.
    ///
    /// `table_size` is only used (and validated) in fast mode.
    pub fn build(mode: PrecisionMode, table_size: usize) -> Result<Self, ConfigurationError> {
        match mode {
            PrecisionMode::Precise => Ok(MathEnvironment::Precise(PreciseMath::new())),
            PrecisionMode::Fast => {
                let fast = FastMath::new(table_size)?;
                tracing::info!(
                    table_size,
                    resolution = fast.resolution(),
                    "fast-math lookup tables initialized"
                );
                Ok(MathEnvironment::Fast(fast))
            }
        }
    }
}

impl Default for MathEnvironment {
    fn default() -> Self {
        MathEnvironment::Precise(PreciseMath::new())
    }
}

impl MathFunctions for MathEnvironment {
    #[inline]
    fn sin(&self, x: f64) -> f64 {
        match self {
            MathEnvironment::Precise(m) => m.sin(x),
            MathEnvironment::Fast(m) => m.sin(x),
        }
    }

    #[inline]
    fn cos(&self, x: f64) -> f64 {
        match self {
            MathEnvironment::Precise(m) => m.cos(x),
            MathEnvironment::Fast(m) => m.cos(x),
        }
    }

    #[inline]
    fn tan(&self, x: f64) -> f64 {
        match self {
            MathEnvironment::Precise(m) => m.tan(x),
            MathEnvironment::Fast(m) => m.tan(x),
        }
    }

    #[inline]
    fn pow2(&self, x: f64) -> f64 {
        match self {
            MathEnvironment::Precise(m) => m.pow2(x),
            MathEnvironment::Fast(m) => m.pow2(x),
        }
    }

    #[inline]
    fn random(&mut self) -> f64 {
        match self {
            MathEnvironment::Precise(m) => m.random(),
            MathEnvironment::Fast(m) => m.random(),
        }
    }

    fn mode(&self) -> PrecisionMode {
        match self {
            MathEnvironment::Precise(m) => m.mode(),
            MathEnvironment::Fast(m) => m.mode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- builtin table ----

    #[test]
    fn builtin_names_roundtrip() {
        for b in Builtin::ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("atan"), None);
    }

    #[test]
    fn builtin_arity() {
        assert_eq!(Builtin::Random.arity(), 0);
        assert_eq!(Builtin::Sin.arity(), 1);
        assert_eq!(Builtin::Pow.arity(), 2);
        assert_eq!(Builtin::Max.arity(), 2);
    }

    // ---- fast trig ----

    #[test]
    fn rejects_bad_table_sizes() {
        assert_eq!(
            FastMath::new(1000).unwrap_err(),
            ConfigurationError::InvalidTableSize(1000)
        );
        assert!(FastMath::new(8).is_err());
        assert!(FastMath::new(0).is_err());
        assert!(FastMath::new(16).is_ok());
    }

    #[test]
    fn sin_accuracy_holds_for_large_arguments() {
        let fast = FastMath::new(DEFAULT_TABLE_SIZE).unwrap();
        let bound = fast.resolution() * (1.0 + 1e-3);
        for base in [1e6, -1e6, 1e9, -1e9] {
            for i in 0..2000 {
                let x = base + f64::from(i) * 0.0137;
                let err = (fast.sin(x) - x.sin()).abs();
                assert!(err <= bound, "sin({x}) error {err} exceeds {bound}");
            }
        }
    }

    #[test]
    fn sin_accuracy_sweep() {
        let fast = FastMath::new(DEFAULT_TABLE_SIZE).unwrap();
        let bound = fast.resolution();
        let mut max_err: f64 = 0.0;
        for i in -5000..5000 {
            let x = i as f64 * 0.0137;
            let err = (fast.sin(x) - x.sin()).abs();
            max_err = max_err.max(err);
        }
        assert!(max_err <= bound, "max sin error {max_err} exceeds {bound}");
    }

    #[test]
    fn cos_cardinal_points() {
        let fast = FastMath::new(512).unwrap();
        assert!((fast.cos(0.0) - 1.0).abs() < 1e-6);
        assert!(fast.sin(0.0).abs() < 1e-6);
        // Exactly a quarter of the table.
        assert!((fast.sin(std::f64::consts::FRAC_PI_2 + 1e-9) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn trig_wraps_and_tolerates_non_finite() {
        let fast = FastMath::new(256).unwrap();
        let a = fast.sin(1.0);
        assert_eq!(fast.sin(1.0 + TAU * 3.0), a);
        assert!(fast.sin(f64::NAN).is_finite());
        assert!(fast.sin(f64::INFINITY).is_finite());
        assert!(fast.sin(-1e300).is_finite());
    }

    // ---- pow2 cache ----

    #[test]
    fn pow2_cache_semitones() {
        let fast = FastMath::new(DEFAULT_TABLE_SIZE).unwrap();
        assert!((fast.pow2(0.0) - 1.0).abs() < 1e-6);
        assert!((fast.pow2(1.0) - 2.0).abs() < 1e-6);
        assert!((fast.pow2(-1.0) - 0.5).abs() < 1e-6);
        let semitone = fast.pow2(1.0 / 12.0);
        assert!((semitone - 2f64.powf(1.0 / 12.0)).abs() < 1e-6);
    }

    #[test]
    fn pow2_out_of_range_falls_back() {
        let fast = FastMath::new(DEFAULT_TABLE_SIZE).unwrap();
        assert_eq!(fast.pow2(30.0), 30f64.exp2());
        assert_eq!(fast.pow2(-30.0), (-30f64).exp2());
    }

    #[test]
    fn pow_routes_base_two() {
        let fast = FastMath::new(DEFAULT_TABLE_SIZE).unwrap();
        assert_eq!(fast.pow(2.0, 0.5 / 12.0), fast.pow2(0.5 / 12.0));
        assert_eq!(fast.pow(3.0, 2.0), 9.0);
    }

    // ---- generators ----

    #[test]
    fn xorshift_is_deterministic() {
        let mut a = Xorshift32::default();
        let mut b = Xorshift32::new(XORSHIFT_SEED);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        assert_eq!(Xorshift32::new(0), Xorshift32::default());
    }

    #[test]
    fn random_in_unit_interval() {
        let mut fast = FastMath::new(DEFAULT_TABLE_SIZE).unwrap();
        let mut precise = PreciseMath::with_seed(7);
        for _ in 0..10_000 {
            let f = fast.random();
            let p = precise.random();
            assert!((0.0..1.0).contains(&f));
            assert!((0.0..1.0).contains(&p));
        }
    }

    #[test]
    fn fast_random_sequence_repeats_per_environment() {
        let mut a = MathEnvironment::build(PrecisionMode::Fast, 64).unwrap();
        let mut b = MathEnvironment::build(PrecisionMode::Fast, 64).unwrap();
        let xs: Vec<f64> = (0..8).map(|_| a.random()).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.random()).collect();
        assert_eq!(xs, ys);
    }

    // ---- shared functions ----

    #[test]
    fn apply_shared_functions() {
        let mut m = PreciseMath::with_seed(1);
        assert_eq!(m.apply(Builtin::Round, &[2.5]), 3.0);
        assert_eq!(m.apply(Builtin::Round, &[-2.5]), -2.0);
        assert_eq!(m.apply(Builtin::Floor, &[-1.5]), -2.0);
        assert_eq!(m.apply(Builtin::Min, &[3.0, -1.0]), -1.0);
        assert!(m.apply(Builtin::Max, &[f64::NAN, 1.0]).is_nan());
        assert_eq!(m.apply(Builtin::Pow, &[2.0, 10.0]), 1024.0);
    }

    #[test]
    fn environment_reports_mode() {
        let precise = MathEnvironment::build(PrecisionMode::Precise, 3).unwrap();
        assert_eq!(precise.mode(), PrecisionMode::Precise);
        let fast = MathEnvironment::build(PrecisionMode::Fast, 1024).unwrap();
        assert_eq!(fast.mode(), PrecisionMode::Fast);
        assert!(MathEnvironment::build(PrecisionMode::Fast, 3).is_err());
    }
}
