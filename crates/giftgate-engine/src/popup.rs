#![forbid(unsafe_code)]

//! The gift selection popup state machine.
//!
//! Lifecycle: `closed -> open(tier, max_selectable, offered) ->
//! {confirmed | skipped | dismissed} -> closed`. While open, the shopper
//! toggles offered entries; the selection count is clamped to
//! `[0, max_selectable]` and toggling past the cap is a no-op.
//!
//! The popup itself is pure state. Presentation and the single-instance /
//! processing guard live in the controller that owns it.

use giftgate_core::cart::VariantId;
use giftgate_core::catalog::GiftEntry;
use giftgate_core::tier::Tier;

/// Result of toggling an entry in an open popup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    Selected,
    Deselected,
    /// Selection is at `max_selectable`; the toggle was ignored.
    AtCapacity,
    /// The variant is not among the offered entries.
    NotOffered,
}

/// An open gift selection popup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GiftPopup {
    tier: Tier,
    max_selectable: usize,
    offered: Vec<GiftEntry>,
    selected: Vec<VariantId>,
}

impl GiftPopup {
    /// Open a popup for `tier` offering `offered`, allowing up to
    /// `max_selectable` picks. Callers must ensure `max_selectable > 0`;
    /// a zero cap means the popup should not open at all.
    #[must_use]
    pub fn new(tier: Tier, max_selectable: usize, offered: Vec<GiftEntry>) -> Self {
        debug_assert!(max_selectable > 0);
        Self {
            tier,
            max_selectable,
            offered,
            selected: Vec::new(),
        }
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[must_use]
    pub fn max_selectable(&self) -> usize {
        self.max_selectable
    }

    #[must_use]
    pub fn offered(&self) -> &[GiftEntry] {
        &self.offered
    }

    #[must_use]
    pub fn selected(&self) -> &[VariantId] {
        &self.selected
    }

    #[must_use]
    pub fn is_selected(&self, id: &VariantId) -> bool {
        self.selected.contains(id)
    }

    /// Whether the confirm action is currently enabled.
    #[must_use]
    pub fn can_confirm(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Toggle an offered entry in or out of the selection.
    pub fn toggle(&mut self, id: &VariantId) -> ToggleOutcome {
        if !self.offered.iter().any(|e| e.variant_id == *id) {
            return ToggleOutcome::NotOffered;
        }
        if let Some(pos) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(pos);
            ToggleOutcome::Deselected
        } else if self.selected.len() < self.max_selectable {
            self.selected.push(id.clone());
            ToggleOutcome::Selected
        } else {
            ToggleOutcome::AtCapacity
        }
    }

    /// Consume the popup, yielding the confirmed selection.
    #[must_use]
    pub fn confirm(self) -> Vec<VariantId> {
        self.selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn popup(max: usize) -> GiftPopup {
        GiftPopup::new(
            Tier::Two,
            max,
            vec![
                GiftEntry::new("100", "Timer"),
                GiftEntry::new("101", "Highlighters"),
                GiftEntry::new("200", "Deck"),
            ],
        )
    }

    #[test]
    fn toggle_selects_and_deselects() {
        let mut p = popup(2);
        assert_eq!(p.toggle(&"100".into()), ToggleOutcome::Selected);
        assert!(p.is_selected(&"100".into()));
        assert_eq!(p.toggle(&"100".into()), ToggleOutcome::Deselected);
        assert!(!p.can_confirm());
    }

    #[test]
    fn selection_is_clamped_to_cap() {
        let mut p = popup(2);
        assert_eq!(p.toggle(&"100".into()), ToggleOutcome::Selected);
        assert_eq!(p.toggle(&"101".into()), ToggleOutcome::Selected);
        assert_eq!(p.toggle(&"200".into()), ToggleOutcome::AtCapacity);
        assert_eq!(p.selected().len(), 2);

        // Deselecting frees a slot.
        assert_eq!(p.toggle(&"100".into()), ToggleOutcome::Deselected);
        assert_eq!(p.toggle(&"200".into()), ToggleOutcome::Selected);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let mut p = popup(1);
        assert_eq!(p.toggle(&"999".into()), ToggleOutcome::NotOffered);
        assert!(p.selected().is_empty());
    }

    #[test]
    fn confirm_yields_selection_in_pick_order() {
        let mut p = popup(2);
        p.toggle(&"200".into());
        p.toggle(&"100".into());
        assert_eq!(
            p.confirm(),
            vec![VariantId::new("200"), VariantId::new("100")]
        );
    }
}
