//! Aggregated outcome of a selection

use std::collections::BTreeMap;

/// Smart cards indexed by selection case, with at most one active case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult<C> {
    cards: BTreeMap<usize, C>,
    active: Option<usize>,
}

impl<C> Default for SelectionResult<C> {
    fn default() -> Self {
        Self {
            cards: BTreeMap::new(),
            active: None,
        }
    }
}

impl<C> SelectionResult<C> {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the card of a matching case
    ///
    /// Marking a case active replaces any previously active case.
    pub fn add_card(&mut self, index: usize, card: C, is_active: bool) {
        self.cards.insert(index, card);
        if is_active {
            self.active = Some(index);
        }
    }

    /// Returns true if a case left its logical channel open
    pub const fn has_active_selection(&self) -> bool {
        self.active.is_some()
    }

    /// Index of the active case
    pub const fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Card of the active case
    pub fn active_card(&self) -> Option<&C> {
        self.active.and_then(|index| self.cards.get(&index))
    }

    /// Take the card of the active case
    pub fn into_active_card(mut self) -> Option<C> {
        self.active.and_then(|index| self.cards.remove(&index))
    }

    /// Card of a given case, if it matched
    pub fn card(&self, index: usize) -> Option<&C> {
        self.cards.get(&index)
    }

    /// Returns true if the given case matched
    pub fn has_matched(&self, index: usize) -> bool {
        self.cards.contains_key(&index)
    }

    /// Matching cases in index order
    pub fn cards(&self) -> impl Iterator<Item = (usize, &C)> {
        self.cards.iter().map(|(index, card)| (*index, card))
    }

    /// Number of matching cases
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Returns true if nothing matched
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_card() {
        let mut result = SelectionResult::new();
        assert!(result.is_empty());
        assert!(!result.has_active_selection());

        result.add_card(0, "a", false);
        result.add_card(2, "c", true);

        assert_eq!(result.len(), 2);
        assert_eq!(result.active_index(), Some(2));
        assert_eq!(result.active_card(), Some(&"c"));
        assert!(!result.has_matched(1));
        assert_eq!(result.cards().map(|(i, _)| i).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(result.into_active_card(), Some("c"));
    }

    #[test]
    fn test_single_active_index() {
        let mut result = SelectionResult::new();
        result.add_card(0, 1, true);
        result.add_card(1, 2, true);
        assert_eq!(result.active_index(), Some(1));
    }
}
