use crate::dsp::envelope::{EnvelopeError, EnvelopeTables};
use crate::OPERATOR_COUNT;

/// Which curve set a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveSlot {
    Operator(usize),
    Filter,
}

impl CurveSlot {
    pub const COUNT: usize = OPERATOR_COUNT + 1;

    pub fn index(self) -> Option<usize> {
        match self {
            CurveSlot::Operator(op) if op < OPERATOR_COUNT => Some(op),
            CurveSlot::Operator(_) => None,
            CurveSlot::Filter => Some(OPERATOR_COUNT),
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            i if i < OPERATOR_COUNT => Some(CurveSlot::Operator(i)),
            i if i == OPERATOR_COUNT => Some(CurveSlot::Filter),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = CurveSlot> {
        (0..Self::COUNT).filter_map(Self::from_index)
    }
}

/// The audio thread's current curve sets, one per operator plus the filter.
///
/// Installing a table hands back the previous box so the caller can send it
/// somewhere else to be freed.
#[derive(Debug)]
pub struct CurveBank {
    tables: [Box<EnvelopeTables>; CurveSlot::COUNT],
}

impl CurveBank {
    pub fn new(sample_rate: f32) -> Result<Self, EnvelopeError> {
        let tables = EnvelopeTables::build(Default::default(), sample_rate)?;
        Ok(Self {
            tables: std::array::from_fn(|_| Box::new(tables.clone())),
        })
    }

    #[inline]
    pub fn operator(&self, op: usize) -> &EnvelopeTables {
        &self.tables[op.min(OPERATOR_COUNT - 1)]
    }

    #[inline]
    pub fn filter(&self) -> &EnvelopeTables {
        &self.tables[OPERATOR_COUNT]
    }

    pub fn get(&self, slot: CurveSlot) -> Option<&EnvelopeTables> {
        slot.index().map(|i| &*self.tables[i])
    }

    /// Returns the box the caller now owns: the replaced table, or `tables`
    /// itself when the slot is out of range.
    pub fn install(&mut self, slot: CurveSlot, tables: Box<EnvelopeTables>) -> Box<EnvelopeTables> {
        match slot.index() {
            Some(i) => std::mem::replace(&mut self.tables[i], tables),
            None => tables,
        }
    }

    /// Re-renders every set for a new sample rate. Allocates; call outside
    /// the render callback.
    pub fn rebuild_for_rate(&mut self, sample_rate: f32) -> Result<(), EnvelopeError> {
        for tables in self.tables.iter_mut() {
            **tables = tables.rebuilt_for(sample_rate)?;
        }
        Ok(())
    }

    /// True when any set was rendered for a different rate.
    pub fn is_stale(&self, sample_rate: f32) -> bool {
        self.tables.iter().any(|t| t.sample_rate() != sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::EnvelopeParams;

    #[test]
    fn slot_indexing() {
        assert_eq!(CurveSlot::Operator(2).index(), Some(2));
        assert_eq!(CurveSlot::Filter.index(), Some(OPERATOR_COUNT));
        assert_eq!(CurveSlot::Operator(OPERATOR_COUNT).index(), None);
        assert_eq!(CurveSlot::all().count(), CurveSlot::COUNT);
    }

    #[test]
    fn install_returns_previous() {
        let mut bank = CurveBank::new(44_100.0).unwrap();
        let params = EnvelopeParams::dahdsr(0.0, 1.0, 0.0, 1.0, 0.2, 1.0);
        let new = Box::new(EnvelopeTables::build(params, 44_100.0).unwrap());

        let old = bank.install(CurveSlot::Operator(1), new);
        assert_eq!(*old.params(), EnvelopeParams::default());
        assert_eq!(*bank.operator(1).params(), params);

        let rejected = Box::new(EnvelopeTables::build(params, 44_100.0).unwrap());
        let back = bank.install(CurveSlot::Operator(99), rejected);
        assert_eq!(*back.params(), params);
    }

    #[test]
    fn rebuild_tracks_rate() {
        let mut bank = CurveBank::new(44_100.0).unwrap();
        assert!(bank.is_stale(48_000.0));
        bank.rebuild_for_rate(48_000.0).unwrap();
        assert!(!bank.is_stale(48_000.0));
        assert_eq!(bank.filter().sample_rate(), 48_000.0);
    }
}
