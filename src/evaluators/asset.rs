use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ObjectId, Price};
use crate::db::objects::{
    Asset, AssetBitassetData, AssetDynamicData, BitassetOptions, OperationResult, PriceFeed,
};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct AssetCreateEvaluator {
    issuer: ObjectId,
    symbol: String,
    precision: u8,
    is_market_issued: bool,
    market_fee_percent: u16,
    max_market_fee: Amount,
    core_exchange_rate: Price,
    bitasset_opts: Option<BitassetOptions>,
}

impl AssetCreateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::AssetCreate {
                issuer,
                symbol,
                precision,
                is_market_issued,
                market_fee_percent,
                max_market_fee,
                core_exchange_rate,
                bitasset_opts,
            } => Ok(Self {
                issuer: *issuer,
                symbol: symbol.clone(),
                precision: *precision,
                is_market_issued: *is_market_issued,
                market_fee_percent: *market_fee_percent,
                max_market_fee: *max_market_fee,
                core_exchange_rate: *core_exchange_rate,
                bitasset_opts: bitasset_opts.clone(),
            }),
            _ => Err(InvalidOperation::Other("not an AssetCreate").into()),
        }
    }
}

impl Evaluator for AssetCreateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.issuer
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        db.accounts.get(self.issuer)?;
        if self.is_market_issued && self.bitasset_opts.is_none() {
            return Err(InvalidOperation::Other(
                "market-issued asset requires bitasset_opts",
            )
            .into());
        }
        if db.assets.iter().any(|(_, a)| a.symbol == self.symbol) {
            return Err(InvalidOperation::Other("symbol already registered").into());
        }
        Ok(fees.fee_for(FeeKind::AssetCreate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let asset_id = db.assets.reserve_id();
        let dyn_id = db.asset_dynamic_data.reserve_id();
        db.asset_dynamic_data.insert(
            dyn_id,
            AssetDynamicData {
                id: dyn_id,
                ..Default::default()
            },
            undo,
        )?;

        let bitasset_id = if let Some(opts) = &self.bitasset_opts {
            let bitasset_id = db.asset_bitasset_data.reserve_id();
            let default_feed = PriceFeed {
                settlement_price: self.core_exchange_rate,
                maintenance_collateral_ratio: 1_750, // 175%, spec §4.6 default MCR
                maximum_short_squeeze_ratio: 1_500,
                core_exchange_rate: self.core_exchange_rate,
            };
            db.asset_bitasset_data.insert(
                bitasset_id,
                AssetBitassetData {
                    id: bitasset_id,
                    asset_id,
                    feeds: Default::default(),
                    current_feed: default_feed,
                    current_feed_publication_time: 0,
                    options: opts.clone(),
                    is_prediction_market: false,
                    settlement_price: self.core_exchange_rate,
                    settlement_fund: Amount::ZERO,
                    globally_settled: false,
                },
                undo,
            )?;
            Some(bitasset_id)
        } else {
            None
        };

        db.assets.insert(
            asset_id,
            Asset {
                id: asset_id,
                symbol: self.symbol.clone(),
                precision: self.precision,
                issuer: self.issuer,
                dynamic_data: dyn_id,
                bitasset_data: bitasset_id,
                is_market_issued: self.is_market_issued,
                market_fee_percent: self.market_fee_percent,
                max_market_fee: self.max_market_fee,
                core_exchange_rate: self.core_exchange_rate,
            },
            undo,
        )?;

        Ok(OperationResult::ObjectCreated(asset_id))
    }
}

pub struct AssetUpdateFeedEvaluator {
    publisher: ObjectId,
    asset_id: ObjectId,
    feed: PriceFeed,
}

impl AssetUpdateFeedEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::AssetUpdateFeed {
                publisher,
                asset_id,
                feed,
            } => Ok(Self {
                publisher: *publisher,
                asset_id: *asset_id,
                feed: *feed,
            }),
            _ => Err(InvalidOperation::Other("not an AssetUpdateFeed").into()),
        }
    }
}

impl Evaluator for AssetUpdateFeedEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.publisher
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let asset = db.assets.get(self.asset_id)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or_else(|| InvalidOperation::Other("asset is not market-issued"))?;
        let bitasset = db.asset_bitasset_data.get(bitasset_id)?;
        if bitasset.globally_settled {
            return Err(crate::error::MarketError::AlreadyGloballySettled.into());
        }
        Ok(fees.fee_for(FeeKind::AssetUpdateFeed))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let asset = db.assets.get(self.asset_id)?.clone();
        let bitasset_id = asset.bitasset_data.expect("checked in evaluate");
        let now = db.dynamic_global_properties.iter().next().map(|(_, p)| p.time).unwrap_or(0);

        db.asset_bitasset_data.modify(bitasset_id, undo, |b| {
            b.feeds.insert(self.publisher, (now, self.feed));
            b.current_feed_publication_time = now;
        })?;

        recompute_median_feed(db, undo, bitasset_id)?;

        Ok(OperationResult::Void)
    }
}

/// Recomputes `current_feed` as the median of unexpired feeds, dropping
/// the asset's price exposure if fewer than `minimum_feeds` remain (spec
/// §4.6) by simply leaving the stale feed in place until enough
/// publishers refresh it.
fn recompute_median_feed(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    bitasset_id: ObjectId,
) -> ChainResult<()> {
    let bitasset = db.asset_bitasset_data.get(bitasset_id)?.clone();
    let now = db
        .dynamic_global_properties
        .iter()
        .next()
        .map(|(_, p)| p.time)
        .unwrap_or(0);
    let lifetime = bitasset.options.feed_lifetime;

    let mut live: Vec<&PriceFeed> = bitasset
        .feeds
        .values()
        .filter(|(t, _)| now.saturating_sub(*t) <= lifetime)
        .map(|(_, f)| f)
        .collect();

    if (live.len() as u8) < bitasset.options.minimum_feeds {
        return Ok(());
    }

    live.sort_by(|a, b| {
        if a.settlement_price.less_than(&b.settlement_price) {
            std::cmp::Ordering::Less
        } else if b.settlement_price.less_than(&a.settlement_price) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    let median = *live[live.len() / 2];

    db.asset_bitasset_data.modify(bitasset_id, undo, |b| {
        b.current_feed = median;
    })?;
    Ok(())
}
