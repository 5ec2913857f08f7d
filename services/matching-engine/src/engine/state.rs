//! Orders of one market between matching passes

use std::collections::BTreeMap;

use exchange_types::errors::OrderError;
use exchange_types::ids::{OrderHash, SubaccountId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::{sort_by_price_priority, BookOrder, LimitBookOrder, PriceLevel, SideBook};
use crate::orders::TopOfBook;

/// Where a cancelled order was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderLocation {
    Resting,
    Transient,
}

/// Depth of both sides, best price first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub buys: Vec<PriceLevel>,
    pub sells: Vec<PriceLevel>,
}

/// Resting books, the block's transient limit orders and queued market
/// orders of one market, plus the live client order ids
#[derive(Debug, Clone)]
pub struct MarketOrders<L, M> {
    buys: SideBook<L>,
    sells: SideBook<L>,
    transient_buys: Vec<L>,
    transient_sells: Vec<L>,
    market_buys: Vec<M>,
    market_sells: Vec<M>,
    cids: BTreeMap<(SubaccountId, String), OrderHash>,
}

impl<L: LimitBookOrder, M: BookOrder> MarketOrders<L, M> {
    pub fn new() -> Self {
        Self {
            buys: SideBook::new(true),
            sells: SideBook::new(false),
            transient_buys: Vec::new(),
            transient_sells: Vec::new(),
            market_buys: Vec::new(),
            market_sells: Vec::new(),
            cids: BTreeMap::new(),
        }
    }

    pub fn side(&self, is_buy: bool) -> &SideBook<L> {
        if is_buy {
            &self.buys
        } else {
            &self.sells
        }
    }

    fn side_mut(&mut self, is_buy: bool) -> &mut SideBook<L> {
        if is_buy {
            &mut self.buys
        } else {
            &mut self.sells
        }
    }

    pub fn top_of_book(&self) -> TopOfBook {
        TopOfBook {
            best_buy: self.buys.best_price(),
            best_sell: self.sells.best_price(),
        }
    }

    pub fn snapshot(&self, depth: usize) -> OrderbookSnapshot {
        OrderbookSnapshot {
            buys: self.buys.depth_snapshot(depth),
            sells: self.sells.depth_snapshot(depth),
        }
    }

    pub fn resting_order(&self, order_hash: &OrderHash) -> Option<&L> {
        self.buys.get(order_hash).or_else(|| self.sells.get(order_hash))
    }

    /// Reserve a client order id; an empty cid is never tracked
    pub fn register_cid(&mut self, subaccount_id: SubaccountId, cid: &str, order_hash: OrderHash) -> Result<(), OrderError> {
        if cid.is_empty() {
            return Ok(());
        }
        let key = (subaccount_id, cid.to_string());
        if self.cids.contains_key(&key) {
            return Err(OrderError::DuplicateCid { cid: cid.to_string() });
        }
        self.cids.insert(key, order_hash);
        Ok(())
    }

    pub fn ensure_cid_free(&self, subaccount_id: SubaccountId, cid: &str) -> Result<(), OrderError> {
        if !cid.is_empty() && self.cids.contains_key(&(subaccount_id, cid.to_string())) {
            return Err(OrderError::DuplicateCid { cid: cid.to_string() });
        }
        Ok(())
    }

    pub fn release_cid<O: BookOrder>(&mut self, order: &O) {
        let info = order.order_info();
        self.cids.remove(&(info.subaccount_id, info.cid.clone()));
    }

    pub fn order_hash_by_cid(&self, subaccount_id: SubaccountId, cid: &str) -> Option<OrderHash> {
        self.cids.get(&(subaccount_id, cid.to_string())).copied()
    }

    pub fn insert_resting(&mut self, order: L) {
        self.side_mut(order.is_buy()).insert(order);
    }

    pub fn push_transient(&mut self, order: L) {
        if order.is_buy() {
            self.transient_buys.push(order);
        } else {
            self.transient_sells.push(order);
        }
    }

    pub fn push_market_order(&mut self, order: M) {
        if order.is_buy() {
            self.market_buys.push(order);
        } else {
            self.market_sells.push(order);
        }
    }

    pub fn has_transient_orders(&self) -> bool {
        !self.transient_buys.is_empty() || !self.transient_sells.is_empty()
    }

    /// Take the transient orders of both sides, buys first
    pub fn take_transient(&mut self) -> (Vec<L>, Vec<L>) {
        (
            std::mem::take(&mut self.transient_buys),
            std::mem::take(&mut self.transient_sells),
        )
    }

    /// Take the queued market orders of one direction in price priority
    pub fn take_market_orders(&mut self, is_buy: bool) -> Vec<M> {
        let mut orders = if is_buy {
            std::mem::take(&mut self.market_buys)
        } else {
            std::mem::take(&mut self.market_sells)
        };
        sort_by_price_priority(&mut orders, is_buy);
        orders
    }

    /// Remove an order of `subaccount_id` from the books or the transient
    /// queue. Orders of other subaccounts are never found.
    pub fn remove_limit_order(&mut self, subaccount_id: SubaccountId, order_hash: &OrderHash) -> Option<(L, OrderLocation)> {
        for is_buy in [true, false] {
            let owned = self
                .side(is_buy)
                .get(order_hash)
                .is_some_and(|o| o.subaccount_id() == subaccount_id);
            if owned {
                let order = self.side_mut(is_buy).remove(order_hash)?;
                self.release_cid(&order);
                return Some((order, OrderLocation::Resting));
            }
        }

        let order = [&mut self.transient_buys, &mut self.transient_sells]
            .into_iter()
            .find_map(|transient| {
                let position = transient
                    .iter()
                    .position(|o| o.order_hash() == *order_hash && o.subaccount_id() == subaccount_id)?;
                Some(transient.remove(position))
            })?;
        self.release_cid(&order);
        Some((order, OrderLocation::Transient))
    }

    /// Resting orders matching `predicate`, best price first on each side
    pub fn resting_orders_where(&self, predicate: impl Fn(&L) -> bool) -> Vec<L> {
        self.buys
            .orders_best_first()
            .into_iter()
            .chain(self.sells.orders_best_first())
            .filter(|o| predicate(o))
            .collect()
    }

    /// Write back a resting order whose fillable went down during a pass
    pub fn apply_fill(&mut self, order: &L) {
        let is_buy = order.is_buy();
        if order.fillable() <= Decimal::ZERO {
            if self.side_mut(is_buy).remove(&order.order_hash()).is_some() {
                self.release_cid(order);
            }
        } else {
            self.side_mut(is_buy).update_fillable(&order.order_hash(), order.fillable());
        }
    }

    pub fn resting_count(&self) -> usize {
        self.buys.len() + self.sells.len()
    }
}

impl<L: LimitBookOrder, M: BookOrder> Default for MarketOrders<L, M> {
    fn default() -> Self {
        Self::new()
    }
}
