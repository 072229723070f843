//! Box settlement planning.
//!
//! Ties the price resolver and the refund allocator together: for a sealed
//! box it produces the single `SettlementPlan` that every payout of the box
//! is derived from.

use boxswap_domain::{BoxAggregates, Order, Payout, Reserves, SettlementPlan};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::params::SettlementParams;
use crate::price::{PriceBands, PriceResolver};
use crate::refund::RefundAllocator;

/// Pure, deterministic settlement engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementEngine {
    params: SettlementParams,
    resolver: PriceResolver,
    allocator: RefundAllocator,
}

impl SettlementEngine {
    /// Create an engine after validating its parameters
    pub fn new(params: SettlementParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            resolver: PriceResolver::new(params),
            allocator: RefundAllocator::new(params),
        })
    }

    /// Parameters in use
    pub fn params(&self) -> &SettlementParams {
        &self.params
    }

    /// Price resolver in use
    pub fn resolver(&self) -> &PriceResolver {
        &self.resolver
    }

    /// Reject reserves whose price bands cannot be represented
    ///
    /// Every box planned against such a pool would fault, as would a pool
    /// whose lowest allowed price truncates to zero.
    pub fn check_pool(&self, reserves: Reserves) -> EngineResult<PriceBands> {
        let bands = self.resolver.bands(reserves).map_err(|err| {
            EngineError::InvalidAmount(format!(
                "pool ratio {}:{} is out of range ({})",
                reserves.base, reserves.settlement, err
            ))
        })?;
        if bands.secure_lower == 0 {
            return Err(EngineError::InvalidAmount(format!(
                "pool ratio {}:{} prices the settlement asset at zero",
                reserves.base, reserves.settlement
            )));
        }
        Ok(bands)
    }

    /// Plan the settlement of a box against the current reserves
    ///
    /// A box without flow trades nothing: price zero, reserves unchanged.
    pub fn plan(&self, reserves: Reserves, aggregates: &BoxAggregates) -> EngineResult<SettlementPlan> {
        if aggregates.is_empty() {
            return Ok(SettlementPlan::no_trade(reserves));
        }

        let allocation = self.allocator.allocate(reserves, aggregates)?;
        let (reserves_after, lien) = self.resolver.reserves_after(
            reserves,
            aggregates,
            allocation.price,
            &allocation.refund_rates,
        )?;

        debug!(
            price = %allocation.price,
            base_reserve = reserves_after.base,
            settlement_reserve = reserves_after.settlement,
            "Planned box settlement"
        );

        Ok(SettlementPlan {
            price: allocation.price,
            refund_rates: allocation.refund_rates,
            reserves_after,
            lien,
        })
    }

    /// Payout owed to one order of a planned box
    pub fn payout(&self, order: &Order, plan: &SettlementPlan) -> EngineResult<Payout> {
        self.allocator.payout(order, plan)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::{LienAccrual, RefundRate, RefundRates};

    const FULL: u128 = 1_003_000_000_000_000_000;

    struct Fixture {
        reserves: (u128, u128),
        totals: (u128, u128, u128, u128),
        price: u128,
        rates: [u128; 4],
        after: (u128, u128),
    }

    fn fixtures() -> Vec<Fixture> {
        vec![
            Fixture {
                reserves: (200_000, 100_000),
                totals: (200, 200, 150, 150),
                price: 500_497_512_437_810_945,
                rates: [0, 0, 0, 0],
                after: (199_802, 100_100),
            },
            Fixture {
                reserves: (200_000, 100_000),
                totals: (150, 700, 150, 100),
                price: 499_500_000_000_000_000,
                rates: [0, 213_063_992_563_992_563, 0, 0],
                after: (200_201, 99_900),
            },
            Fixture {
                reserves: (200_000, 100_000),
                totals: (750, 400, 100, 150),
                price: 499_379_190_464_365_532,
                rates: [0, FULL, 0, 0],
                after: (200_250, 99_876),
            },
            Fixture {
                reserves: (200_000, 100_000),
                totals: (150, 100, 100, 150),
                price: 500_500_000_000_000_000,
                rates: [0, 0, 0, 164_324_833_333_333_333],
                after: (199_800, 100_100),
            },
            Fixture {
                reserves: (200_000, 100_000),
                totals: (150, 100, 350, 150),
                price: 501_120_238_984_316_654,
                rates: [0, 0, 0, FULL],
                after: (199_553, 100_224),
            },
            Fixture {
                reserves: (20_000, 10_000),
                totals: (150, 100, 750, 150),
                price: 525_000_000_000_000_000,
                rates: [0, 0, 156_802_333_333_333_333, FULL],
                after: (19_048, 10_501),
            },
            Fixture {
                reserves: (20_000, 10_000),
                totals: (1800, 400, 100, 150),
                price: 475_000_000_000_000_000,
                rates: [121_415_789_473_684_210, FULL, 0, 0],
                after: (21_056, 9_500),
            },
            Fixture {
                reserves: (20_000, 10_000),
                totals: (1500, 400, 100, 150),
                price: 476_808_905_380_333_951,
                rates: [0, FULL, 0, 0],
                after: (20_976, 9_536),
            },
            Fixture {
                reserves: (20_000, 10_000),
                totals: (150, 100, 500, 150),
                price: 518_463_810_930_576_070,
                rates: [0, 0, 0, FULL],
                after: (19_288, 10_370),
            },
        ]
    }

    #[test]
    fn test_reference_fixtures() {
        let engine = SettlementEngine::new(SettlementParams::default()).unwrap();

        for (i, f) in fixtures().into_iter().enumerate() {
            let (bn, bl, sn, sl) = f.totals;
            let plan = engine
                .plan(
                    Reserves::new(f.reserves.0, f.reserves.1),
                    &BoxAggregates::new(bn, bl, sn, sl),
                )
                .unwrap();

            assert_eq!(plan.price.scaled(), f.price, "fixture {} price", i);
            assert_eq!(
                plan.refund_rates,
                RefundRates(f.rates.map(RefundRate::from_scaled)),
                "fixture {} rates",
                i
            );
            assert_eq!(
                plan.reserves_after,
                Reserves::new(f.after.0, f.after.1),
                "fixture {} reserves",
                i
            );
        }
    }

    #[test]
    fn test_empty_box_is_no_trade() {
        let engine = SettlementEngine::default();
        let reserves = Reserves::new(20_000, 10_000);
        let plan = engine.plan(reserves, &BoxAggregates::default()).unwrap();

        assert!(plan.price.is_zero());
        assert_eq!(plan.reserves_after, reserves);
        assert_eq!(plan.lien, LienAccrual::default());
    }

    #[test]
    fn test_balanced_box_clears_at_reference() {
        let engine = SettlementEngine::default();
        let reserves = Reserves::new(200_000, 100_000);
        let reference = engine.resolver().reference_price(reserves).unwrap();

        // fee income below one unit truncates away
        let plan = engine.plan(reserves, &BoxAggregates::new(400, 0, 200, 0)).unwrap();
        assert_eq!(plan.price, reference);
        assert_eq!(plan.price.scaled(), 500_000_000_000_000_000);
        assert_eq!(plan.refund_rates, RefundRates::default());
        assert_eq!(plan.reserves_after, reserves);
        assert_eq!(plan.lien, LienAccrual::default());

        // a larger balanced box keeps the fee in the pool and accrues lien
        let plan = engine
            .plan(reserves, &BoxAggregates::new(40_000, 0, 20_000, 0))
            .unwrap();
        assert_eq!(plan.price, reference);
        assert_eq!(plan.reserves_after, Reserves::new(200_095, 100_047));
        assert_eq!(
            plan.lien,
            LienAccrual {
                base_owed: 23,
                settlement_owed: 11
            }
        );
    }

    #[test]
    fn test_check_pool_rejects_unrepresentable_ratios() {
        let engine = SettlementEngine::default();

        let bands = engine.check_pool(Reserves::new(200_000, 100_000)).unwrap();
        assert_eq!(bands.reference, 500_000_000_000_000_000);

        // reference price T·D/E overflows u128
        let steep = Reserves::new(1, 1_000_000_000_000_000_000_000);
        assert!(matches!(engine.check_pool(steep), Err(EngineError::InvalidAmount(_))));
        assert!(engine.plan(steep, &BoxAggregates::new(10, 0, 0, 0)).is_err());

        // reference price truncates to zero
        let flat = Reserves::new(1_000_000_000_000_000_000_000, 1);
        assert!(matches!(engine.check_pool(flat), Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn test_sixteen_order_box() {
        let engine = SettlementEngine::default();
        let plan = engine
            .plan(
                Reserves::new(2_400_000, 1_600_000),
                &BoxAggregates::new(4000, 4000, 640, 6400),
            )
            .unwrap();

        assert_eq!(plan.price.scaled(), 667_333_333_333_333_332);
        assert_eq!(
            plan.refund_rates.0[3],
            RefundRate::from_scaled(15_128_583_333_333_838)
        );
        assert_eq!(plan.reserves_after, Reserves::new(2_397_621, 1_601_616));
    }

    #[test]
    fn test_price_nondecreasing_in_sell_excess_after_caps() {
        let engine = SettlementEngine::default();
        let reserves = Reserves::new(20_000, 10_000);

        let mut last = 0;
        for sell in [0u128, 50, 100, 200, 400, 800, 1600, 3200] {
            let plan = engine
                .plan(reserves, &BoxAggregates::new(100, 0, sell, 0))
                .unwrap();
            assert!(plan.price.scaled() >= last);
            last = plan.price.scaled();
        }
    }
}
