//! Distribution functions for energy-detector statistics
//!
//! Under the noise-only hypothesis the mean of `K` independent `|X|^2` bins
//! of a complex Gaussian process with power `σ²` is `Gamma(K, σ²/K)`, i.e.
//! `2K·E/σ² ~ χ²(2K)`. With a signal of per-bin SNR `γ` added, the same
//! statistic is noncentral `χ'²(2K, 2Kγ)`. Everything here works in the
//! unit-scale Gamma parameterisation:
//!
//! - [`gamma_sf`]: `P(Gamma(k, 1) > x)`, the regularized upper incomplete gamma `Q(k, x)`
//! - [`noncentral_gamma_sf`]: Poisson(μ) mixture of `Q(k + j, x)`
//! - [`gamma_isf`]: inverse of [`gamma_sf`] in `x`
//!
//! A noise reference estimated from `n` sub-bands is itself random. The
//! ratio of an energy to the mean of `n` independent energies of the same
//! law is `F(2k, 2nk)`, handled through the regularized incomplete beta:
//!
//! - [`beta_inc`]: `I_x(a, b)`
//! - [`gamma_ratio_sf`] / [`gamma_ratio_isf`]: tail of that ratio and its inverse
//! - [`trimmed_mean_bias`]: expected mean of the lowest `n` of `m` unit-mean energies
//!
//! All iterative loops carry fixed caps so evaluation time is bounded.

use std::f64::consts::PI;

/// Iteration cap for the series and continued fraction.
const MAX_ITER: usize = 10_000;
/// Cap on Poisson terms in the noncentral sum.
const MAX_POISSON_TERMS: usize = 200_000;
/// Bisection steps for inverse functions.
const BISECTION_STEPS: usize = 200;
const EPS: f64 = 1e-15;
const FPMIN: f64 = 1e-300;
/// Simpson intervals for the order-statistics integral (even).
const QUADRATURE_STEPS: usize = 2000;
/// Tail mass left out of the order-statistics integral on each side.
const QUADRATURE_TAIL: f64 = 1e-12;

/// Natural log of the gamma function (Lanczos, g = 7, n = 9).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x) = π / (sin(πx) · Γ(1-x))
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    let z = x - 1.0;
    let mut ag = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        ag += c / (z + i as f64);
    }
    let t = z + 7.5;
    0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + ag.ln()
}

/// `ln(x^a e^-x / Γ(a))`, the common prefactor of P and Q.
fn ln_prefactor(a: f64, x: f64) -> f64 {
    a * x.ln() - x - ln_gamma(a)
}

/// Series for P(a, x), converges fast for x < a + 1.
fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut del = 1.0 / a;
    let mut sum = del;
    for _ in 0..MAX_ITER {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * ln_prefactor(a, x).exp()
}

/// Modified Lentz continued fraction for Q(a, x), used for x >= a + 1.
fn gamma_q_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    ln_prefactor(a, x).exp() * h
}

/// Regularized lower incomplete gamma `P(a, x)`.
pub fn gamma_cdf(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        gamma_p_series(a, x).clamp(0.0, 1.0)
    } else {
        (1.0 - gamma_q_fraction(a, x)).clamp(0.0, 1.0)
    }
}

/// Regularized upper incomplete gamma `Q(a, x) = P(Gamma(a, 1) > x)`.
pub fn gamma_sf(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        (1.0 - gamma_p_series(a, x)).clamp(0.0, 1.0)
    } else {
        gamma_q_fraction(a, x).clamp(0.0, 1.0)
    }
}

/// `P(Y > x)` for `Y` a Poisson(`mu`) mixture of `Gamma(k + j, 1)`.
///
/// Equals `P(χ'²(2k, 2mu) > 2x)`. Terms are walked upward from `j = 0`
/// using `Q(a + 1, x) = Q(a, x) + x^a e^-x / Γ(a + 1)`.
pub fn noncentral_gamma_sf(k: f64, mu: f64, x: f64) -> f64 {
    if mu <= 0.0 {
        return gamma_sf(k, x);
    }
    if x <= 0.0 {
        return 1.0;
    }

    let last = (mu + 12.0 * mu.sqrt() + 30.0).ceil().min(MAX_POISSON_TERMS as f64) as usize;
    let ln_mu = mu.ln();
    let ln_x = x.ln();

    let mut q = gamma_sf(k, x);
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for j in 0..=last {
        let jf = j as f64;
        let weight = (jf * ln_mu - mu - ln_gamma(jf + 1.0)).exp();
        total += weight * q;
        weight_sum += weight;
        if jf > mu && weight < EPS * total.max(FPMIN) {
            break;
        }
        let a = k + jf;
        q = (q + (a * ln_x - x - ln_gamma(a + 1.0)).exp()).min(1.0);
    }

    // Remaining Poisson mass has q close to 1 for these large-j terms
    (total + (1.0 - weight_sum).max(0.0)).clamp(0.0, 1.0)
}

/// Smallest `x` with `gamma_sf(a, x) <= p`, to within bisection precision.
pub fn gamma_isf(a: f64, p: f64) -> f64 {
    if p >= 1.0 || a <= 0.0 {
        return 0.0;
    }
    if p <= 0.0 {
        return f64::INFINITY;
    }

    // Wilson-Hilferty starting point
    let z = inv_normal_cdf(1.0 - p);
    let h = 1.0 / (9.0 * a);
    let guess = (a * (1.0 - h + z * h.sqrt()).powi(3)).max(a * 1e-3);

    let (mut lo, mut hi) = (0.0, guess.max(1e-12));
    for _ in 0..BISECTION_STEPS {
        if gamma_sf(a, hi) <= p {
            break;
        }
        lo = hi;
        hi *= 2.0;
    }
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if gamma_sf(a, mid) <= p {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1e-13 * hi {
            break;
        }
    }
    hi
}

/// Continued fraction for the incomplete beta (modified Lentz).
fn beta_fraction(a: f64, b: f64, x: f64) -> f64 {
    let clamp = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / clamp(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp(1.0 + aa * d);
        c = clamp(1.0 + aa / c);
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp(1.0 + aa * d);
        c = clamp(1.0 + aa / c);
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta `I_x(a, b)`.
pub fn beta_inc(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (-x).ln_1p();
    let value = if x < (a + 1.0) / (a + b + 2.0) {
        ln_front.exp() * beta_fraction(a, b, x) / a
    } else {
        1.0 - ln_front.exp() * beta_fraction(b, a, 1.0 - x) / b
    };
    value.clamp(0.0, 1.0)
}

/// `P(Binomial(trials, p) <= r)`.
pub fn binomial_cdf(r: usize, trials: usize, p: f64) -> f64 {
    if r >= trials || p <= 0.0 {
        return 1.0;
    }
    if p >= 1.0 {
        return 0.0;
    }
    beta_inc((trials - r) as f64, (r + 1) as f64, 1.0 - p)
}

/// `P(E / Z > f)` with `E ~ Gamma(k, 1/k)` and `Z` the mean of `n`
/// independent copies of `E`, i.e. the tail of `F(2k, 2nk)`.
pub fn gamma_ratio_sf(k: f64, n: f64, f: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    beta_inc(n * k, k, n / (n + f))
}

/// Smallest `f` with `gamma_ratio_sf(k, n, f) <= p`.
pub fn gamma_ratio_isf(k: f64, n: f64, p: f64) -> f64 {
    if p >= 1.0 || k <= 0.0 || n <= 0.0 {
        return 0.0;
    }
    if p <= 0.0 {
        return f64::INFINITY;
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..BISECTION_STEPS {
        if gamma_ratio_sf(k, n, hi) <= p {
            break;
        }
        lo = hi;
        hi *= 2.0;
    }
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if gamma_ratio_sf(k, n, mid) <= p {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1e-13 * hi {
            break;
        }
    }
    hi
}

/// Expected mean of the lowest `n` of `m` independent `Gamma(k, 1/k)`
/// energies, relative to their common mean of 1.
///
/// A draw is among the lowest `n` exactly when at most `n - 1` of the other
/// `m - 1` fall below it, so the sum of the lowest `n` has expectation
/// `m ∫ x f(x) P(Bin(m - 1, F(x)) <= n - 1) dx`.
pub fn trimmed_mean_bias(k: f64, n: usize, m: usize) -> f64 {
    if n == 0 || n >= m || k <= 0.0 {
        return 1.0;
    }

    let lo = gamma_isf(k, 1.0 - QUADRATURE_TAIL) / k;
    let hi = gamma_isf(k, QUADRATURE_TAIL) / k;
    let h = (hi - lo) / QUADRATURE_STEPS as f64;
    let ln_norm = k * k.ln() - ln_gamma(k);

    let mut sum = 0.0;
    for i in 0..=QUADRATURE_STEPS {
        let x = lo + i as f64 * h;
        if x <= 0.0 {
            continue;
        }
        let density = (ln_norm + (k - 1.0) * x.ln() - k * x).exp();
        let kept = binomial_cdf(n - 1, m - 1, gamma_cdf(k, k * x));
        let weight = match i {
            0 => 1.0,
            i if i == QUADRATURE_STEPS => 1.0,
            i if i % 2 == 1 => 4.0,
            _ => 2.0,
        };
        sum += weight * x * density * kept;
    }
    (sum * h / 3.0) * m as f64 / n as f64
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// accurate to ~1.15e-9).
pub fn inv_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
