//! Money-weighted return for irregular dated cash flows.

use chrono::NaiveDate;

use crate::error::{AipError, AipResult};

const DAYS_PER_YEAR: f64 = 365.0;
const INITIAL_GUESS: f64 = 0.1;
const MAX_NEWTON_ITERATIONS: usize = 100;
const MAX_BISECTION_ITERATIONS: usize = 300;
const TOLERANCE: f64 = 1e-10;
const MIN_RATE: f64 = -0.999_999;
const MAX_RATE: f64 = 1e6;

/// A dated signed cash flow. Negative amounts leave the investor's pocket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

impl CashFlow {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        Self { date, amount }
    }
}

/// Net present value with actual/365 discounting from the earliest flow date.
pub fn xnpv(rate: f64, flows: &[CashFlow]) -> f64 {
    let Some(origin) = flows.iter().map(|f| f.date).min() else {
        return 0.0;
    };
    flows
        .iter()
        .map(|f| f.amount / (1.0 + rate).powf(year_fraction(origin, f.date)))
        .sum()
}

fn xnpv_derivative(rate: f64, flows: &[CashFlow], origin: NaiveDate) -> f64 {
    flows
        .iter()
        .map(|f| {
            let t = year_fraction(origin, f.date);
            -t * f.amount / (1.0 + rate).powf(t + 1.0)
        })
        .sum()
}

fn year_fraction(origin: NaiveDate, date: NaiveDate) -> f64 {
    (date - origin).num_days() as f64 / DAYS_PER_YEAR
}

/// Solves for the annual rate at which [`xnpv`] is zero.
///
/// Newton's method from 10%, falling back to bisection over
/// (-99.9999%, 1e8%] when Newton diverges or leaves the domain.
pub fn xirr(flows: &[CashFlow]) -> AipResult<f64> {
    let has_outflow = flows.iter().any(|f| f.amount < 0.0);
    let has_inflow = flows.iter().any(|f| f.amount > 0.0);
    if !has_outflow || !has_inflow {
        return Err(AipError::Arithmetic(
            "xirr needs at least one negative and one positive cash flow".to_string(),
        ));
    }
    if flows.iter().any(|f| !f.amount.is_finite()) {
        return Err(AipError::Arithmetic("non-finite cash flow".to_string()));
    }
    // with a single date every rate discounts nothing
    let first = flows[0].date;
    if flows.iter().all(|f| f.date == first) {
        return Err(AipError::Arithmetic(
            "xirr needs cash flows on at least two dates".to_string(),
        ));
    }

    if let Some(rate) = newton(flows) {
        return Ok(rate);
    }
    bisection(flows)
}

fn newton(flows: &[CashFlow]) -> Option<f64> {
    let origin = flows.iter().map(|f| f.date).min()?;
    let mut rate = INITIAL_GUESS;

    for _ in 0..MAX_NEWTON_ITERATIONS {
        let value = xnpv(rate, flows);
        if value.abs() < TOLERANCE {
            return Some(rate);
        }
        let slope = xnpv_derivative(rate, flows, origin);
        if slope == 0.0 || !slope.is_finite() {
            return None;
        }
        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            return None;
        }
        if (next - rate).abs() < TOLERANCE {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisection(flows: &[CashFlow]) -> AipResult<f64> {
    let mut low = MIN_RATE;
    let mut high = 1.0;
    let low_value = xnpv(low, flows);
    let mut high_value = xnpv(high, flows);

    while low_value.signum() == high_value.signum() {
        if high >= MAX_RATE {
            return Err(AipError::Arithmetic(
                "xirr has no root in the searched rate range".to_string(),
            ));
        }
        high = (high * 2.0).min(MAX_RATE);
        high_value = xnpv(high, flows);
    }

    let low_sign = low_value.signum();
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = 0.5 * (low + high);
        let value = xnpv(mid, flows);
        if value.abs() < TOLERANCE || (high - low) < TOLERANCE {
            return Ok(mid);
        }
        if value.signum() == low_sign {
            low = mid;
        } else {
            high = mid;
        }
    }
    Ok(0.5 * (low + high))
}
