//! Resting-order cursor
//!
//! The persistence layer hands the matcher an ordered cursor over the resting
//! orders of one (market, side): best price first, then insertion order.

/// Ordered, forward-only cursor over resting orders.
///
/// `close` must be called once the cursor is no longer needed, including on
/// early exit from matching.
pub trait RestingCursor<O> {
    fn has_next(&self) -> bool;
    fn peek_value(&self) -> Option<&O>;
    fn advance(&mut self);
    fn close(&mut self);
}

/// Cursor over an in-memory, already sorted snapshot
#[derive(Debug, Clone)]
pub struct SnapshotCursor<O> {
    orders: Vec<O>,
    position: usize,
    closed: bool,
}

impl<O> SnapshotCursor<O> {
    pub fn new(orders: Vec<O>) -> Self {
        Self {
            orders,
            position: 0,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<O> RestingCursor<O> for SnapshotCursor<O> {
    fn has_next(&self) -> bool {
        !self.closed && self.position < self.orders.len()
    }

    fn peek_value(&self) -> Option<&O> {
        if self.closed {
            return None;
        }
        self.orders.get(self.position)
    }

    fn advance(&mut self) {
        if self.has_next() {
            self.position += 1;
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_cursor_walks_in_order() {
        let mut cursor = SnapshotCursor::new(vec![1, 2]);
        assert_eq!(cursor.peek_value(), Some(&1));
        cursor.advance();
        assert_eq!(cursor.peek_value(), Some(&2));
        cursor.advance();
        assert!(!cursor.has_next());
        assert_eq!(cursor.peek_value(), None);
    }

    #[test]
    fn test_closed_cursor_yields_nothing() {
        let mut cursor = SnapshotCursor::new(vec![1]);
        cursor.close();
        assert!(cursor.is_closed());
        assert!(!cursor.has_next());
        assert_eq!(cursor.peek_value(), None);
    }
}
