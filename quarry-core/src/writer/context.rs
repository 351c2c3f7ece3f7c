use crate::Slot;
use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    #[default]
    None,
    SqlCreateTable,
    SqlCreateType,
    SqlDeleteFrom,
    SqlDropTable,
    SqlInsertInto,
    SqlInsertIntoValues,
    SqlJoin,
    SqlMerge,
    SqlSelect,
    SqlSelectFrom,
    SqlSelectGroupBy,
    SqlSelectOrderBy,
    SqlSelectWhere,
    SqlUpdateSet,
    SqlUpsertSet,
}

/// Writer state: the current fragment and the parameter slots recorded so far.
///
/// Recording the same slot twice returns the same placeholder index.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub fragment: Fragment,
    pub qualify_columns: bool,
    slots: Vec<Slot>,
    positions: HashMap<Slot, usize>,
}

impl Context {
    pub fn new(fragment: Fragment, qualify_columns: bool) -> Self {
        Self {
            fragment,
            qualify_columns,
            ..Default::default()
        }
    }

    /// 1-based placeholder index of the slot.
    pub fn bind(&mut self, slot: Slot) -> usize {
        if let Some(index) = self.positions.get(&slot) {
            return *index;
        }
        self.slots.push(slot);
        let index = self.slots.len();
        self.positions.insert(slot, index);
        index
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<Slot> {
        self.slots
    }

    pub fn switch_fragment(&mut self, fragment: Fragment) -> ContextUpdater<'_> {
        let previous = std::mem::replace(&mut self.fragment, fragment);
        ContextUpdater {
            current: self,
            previous,
        }
    }
}

/// Restores the previous fragment on drop.
pub struct ContextUpdater<'a> {
    pub current: &'a mut Context,
    pub previous: Fragment,
}

impl Deref for ContextUpdater<'_> {
    type Target = Context;
    fn deref(&self) -> &Context {
        self.current
    }
}

impl DerefMut for ContextUpdater<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.current
    }
}

impl Drop for ContextUpdater<'_> {
    fn drop(&mut self) {
        self.current.fragment = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueSource;

    #[test]
    fn slots_are_deduplicated() {
        let mut context = Context::new(Fragment::SqlSelect, true);
        assert_eq!(context.bind(Slot::Value(ValueSource::Filter(0))), 1);
        assert_eq!(context.bind(Slot::Take), 2);
        assert_eq!(context.bind(Slot::Value(ValueSource::Filter(0))), 1);
        assert_eq!(context.slots().len(), 2);
    }

    #[test]
    fn fragment_is_restored() {
        let mut context = Context::new(Fragment::SqlSelect, true);
        {
            let updater = context.switch_fragment(Fragment::SqlSelectWhere);
            assert_eq!(updater.fragment, Fragment::SqlSelectWhere);
        }
        assert_eq!(context.fragment, Fragment::SqlSelect);
    }
}
