#![forbid(unsafe_code)]

//! The gift tracker's state transition core.
//!
//! [`GiftController::update`] is a pure-ish message handler: it mutates
//! the in-memory [`GiftState`] and returns [`Cmd`]s describing the side
//! effects to run (cart calls, persistence, outbound events). The engine
//! executes commands and feeds resulting messages back in arrival order,
//! so every total change is evaluated exactly once and in sequence.

use std::time::Duration;

use tracing::{debug, warn};

use giftgate_core::cart::{AddLineRequest, CartSnapshot, VariantId};
use giftgate_core::event::{CartEvent, GiftEvent};
use giftgate_core::tier::Tier;

use crate::config::GiftConfig;
use crate::error::CartError;
use crate::popup::GiftPopup;
use crate::session::GiftState;

/// Messages driving the controller.
#[derive(Debug)]
pub enum Msg {
    /// An external cart notification arrived.
    Cart(CartEvent),
    /// A scheduled cart fetch completed.
    CartFetched(Result<CartSnapshot, CartError>),
    /// The shopper asked to (re)open gift selection from the banner.
    OpenRequested,
    /// The shopper toggled an entry in the open popup.
    Toggle(VariantId),
    /// The shopper confirmed the popup selection.
    Confirm,
    /// The shopper skipped gift selection for this session.
    Skip,
    /// The shopper closed the popup without deciding.
    Dismiss,
}

/// Side effects requested by an update.
#[derive(Debug)]
pub enum Cmd {
    None,
    Batch(Vec<Cmd>),
    /// Fetch the cart after `delay` and deliver `Msg::CartFetched`.
    FetchCart { delay: Duration },
    /// Add gift line items to the external cart.
    AddGifts(Vec<AddLineRequest>),
    /// Remove gift lines for these variants from the external cart.
    RemoveGifts(Vec<VariantId>),
    /// Persist the session skip record.
    RecordSkip,
    /// Persist the gift state record.
    SaveState,
    /// Emit an outbound event to the host.
    Emit(GiftEvent),
}

impl Cmd {
    #[must_use]
    pub fn none() -> Self {
        Cmd::None
    }

    /// Collapse a command list, dropping the wrapper for 0/1 entries.
    #[must_use]
    pub fn batch(mut cmds: Vec<Cmd>) -> Self {
        cmds.retain(|c| !matches!(c, Cmd::None));
        match cmds.len() {
            0 => Cmd::None,
            1 => cmds.pop().expect("len checked"),
            _ => Cmd::Batch(cmds),
        }
    }
}

/// The tracker state machine.
pub struct GiftController {
    config: GiftConfig,
    state: GiftState,
    popup: Option<GiftPopup>,
    session_skipped: bool,
    /// Raw total of the last fetched snapshot; used to skip redundant
    /// fetches when an event reports an unchanged total.
    last_raw_total: Option<u64>,
}

impl GiftController {
    #[must_use]
    pub fn new(config: GiftConfig, state: GiftState, session_skipped: bool) -> Self {
        Self {
            config,
            state,
            popup: None,
            session_skipped,
            last_raw_total: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GiftConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &GiftState {
        &self.state
    }

    /// The open popup, if any.
    #[must_use]
    pub fn popup(&self) -> Option<&GiftPopup> {
        self.popup.as_ref()
    }

    #[must_use]
    pub fn session_skipped(&self) -> bool {
        self.session_skipped
    }

    /// Gifts unlocked but not yet selected. Never negative.
    #[must_use]
    pub fn available_gifts(&self) -> usize {
        self.config
            .thresholds
            .eligible_slots(self.state.last_total_cents)
            .saturating_sub(self.state.selected.count())
    }

    /// Resolve missing catalog images/prices through a lookup.
    pub fn hydrate_catalog(&mut self, lookup: &dyn giftgate_core::catalog::ProductLookup) {
        self.config.catalog.hydrate(lookup);
    }

    /// Handle one message, returning the side effects to execute.
    pub fn update(&mut self, msg: Msg) -> Cmd {
        match msg {
            Msg::Cart(event) => self.on_cart_event(event),
            Msg::CartFetched(Ok(cart)) => self.on_cart_fetched(cart),
            Msg::CartFetched(Err(e)) => {
                warn!(error = %e, "cart fetch failed, keeping last known state");
                Cmd::none()
            }
            Msg::OpenRequested => self.on_open_requested(),
            Msg::Toggle(id) => {
                if let Some(popup) = self.popup.as_mut() {
                    let outcome = popup.toggle(&id);
                    debug!(variant = %id, ?outcome, "popup toggle");
                }
                Cmd::none()
            }
            Msg::Confirm => self.on_confirm(),
            Msg::Skip => self.on_skip(),
            Msg::Dismiss => self.on_dismiss(),
        }
    }

    /// All notification sources converge here: anything that suggests the
    /// cart moved triggers one canonical fetch-and-evaluate pass.
    fn on_cart_event(&mut self, event: CartEvent) -> Cmd {
        match event {
            CartEvent::Changed { total_cents } => {
                if self.last_raw_total == Some(total_cents) {
                    return Cmd::none();
                }
                Cmd::FetchCart {
                    delay: Duration::ZERO,
                }
            }
            CartEvent::RefreshRequested => Cmd::FetchCart {
                delay: Duration::ZERO,
            },
            // Containers may have been recreated; the engine re-syncs the
            // banner after every message, so nothing else to do.
            CartEvent::DrawerOpened => Cmd::none(),
        }
    }

    fn on_cart_fetched(&mut self, cart: CartSnapshot) -> Cmd {
        self.last_raw_total = Some(cart.total_cents);

        // The cart is authoritative: selections whose gift line is gone
        // (failed add, shopper removed it) are forgotten so availability
        // comes back.
        let live = cart.gift_line_ids();
        let dropped = self.state.selected.retain_present(&live);
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "dropped selections missing from cart");
        }

        let total = cart.non_gift_total(&self.config.catalog);
        self.on_total(total)
    }

    /// Evaluate a new canonical non-gift total.
    fn on_total(&mut self, total_cents: u64) -> Cmd {
        let previous = self.state.last_total_cents;
        self.state.last_total_cents = total_cents;
        let eligible = self.config.thresholds.eligible(total_cents);
        debug!(previous, total_cents, ?eligible, "evaluating cart total");

        let mut cmds = Vec::new();

        // Demotion: gifts of tiers above the eligible tier leave the cart
        // and the watermark drops so re-crossing upward re-prompts.
        let mut to_remove = Vec::new();
        for tier in Tier::ALL {
            if eligible.is_none_or(|e| tier > e) {
                to_remove.append(self.state.selected.for_tier_mut(tier));
            }
        }
        self.state.lower_watermark(eligible);
        if !to_remove.is_empty() {
            cmds.push(Cmd::RemoveGifts(to_remove));
            cmds.push(Cmd::Emit(GiftEvent::CartRefreshRequested));
        }

        // An open popup for a tier no longer eligible is stale; close it.
        if self
            .popup
            .as_ref()
            .is_some_and(|p| eligible.is_none_or(|e| p.tier() > e))
        {
            self.popup = None;
            self.state.is_processing = false;
            cmds.push(Cmd::Emit(GiftEvent::PopupClosed));
        }

        // Crossing: at most one popup, for the highest newly crossed tier.
        if !self.session_skipped && self.popup.is_none() && !self.state.is_processing {
            if let Some(tier) = self.config.thresholds.crossed(previous, total_cents) {
                if !self.state.is_shown(tier) {
                    cmds.push(self.open_popup(tier, true));
                }
            }
        }

        cmds.push(Cmd::SaveState);
        Cmd::batch(cmds)
    }

    /// Open the selection popup for `tier`. With `advance_watermark` the
    /// tier is marked shown even when nothing remains selectable.
    fn open_popup(&mut self, tier: Tier, advance_watermark: bool) -> Cmd {
        if advance_watermark {
            self.state.mark_shown(tier);
        }
        let max_selectable = tier.slots().saturating_sub(self.state.selected.count());
        if max_selectable == 0 {
            return Cmd::none();
        }
        let offered = self
            .config
            .catalog
            .offerable(tier, &self.state.selected.all());
        if offered.is_empty() {
            return Cmd::none();
        }
        self.state.is_processing = true;
        self.popup = Some(GiftPopup::new(tier, max_selectable, offered));
        Cmd::Emit(GiftEvent::PopupOpened {
            tier,
            max_selectable,
        })
    }

    /// Manual reopen from the banner: bypasses the session skip and does
    /// not advance the shown watermark.
    fn on_open_requested(&mut self) -> Cmd {
        if self.popup.is_some() || self.state.is_processing {
            return Cmd::none();
        }
        let Some(tier) = self
            .config
            .thresholds
            .eligible(self.state.last_total_cents)
        else {
            return Cmd::none();
        };
        self.open_popup(tier, false)
    }

    fn on_confirm(&mut self) -> Cmd {
        let Some(popup) = self.popup.take() else {
            return Cmd::none();
        };
        self.state.is_processing = false;
        let tier = popup.tier();
        let selected = popup.confirm();
        if selected.is_empty() {
            // Confirm with nothing picked behaves like a dismiss.
            return Cmd::batch(vec![Cmd::Emit(GiftEvent::PopupClosed), Cmd::SaveState]);
        }

        let requests: Vec<AddLineRequest> = selected
            .iter()
            .map(|id| AddLineRequest::gift(id.clone(), tier, &self.config.thresholds))
            .collect();
        self.state.selected.for_tier_mut(tier).extend(selected);

        Cmd::batch(vec![
            Cmd::AddGifts(requests),
            Cmd::Emit(GiftEvent::CartRefreshRequested),
            Cmd::Emit(GiftEvent::PopupClosed),
            Cmd::SaveState,
        ])
    }

    fn on_skip(&mut self) -> Cmd {
        if self.popup.take().is_none() {
            return Cmd::none();
        }
        self.state.is_processing = false;
        self.session_skipped = true;
        Cmd::batch(vec![
            Cmd::RecordSkip,
            Cmd::Emit(GiftEvent::PopupClosed),
            Cmd::SaveState,
        ])
    }

    fn on_dismiss(&mut self) -> Cmd {
        if self.popup.take().is_none() {
            return Cmd::none();
        }
        self.state.is_processing = false;
        Cmd::batch(vec![Cmd::Emit(GiftEvent::PopupClosed), Cmd::SaveState])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giftgate_core::catalog::{GiftCatalog, GiftEntry};
    use giftgate_core::tier::Thresholds;
    use proptest::prelude::*;

    fn catalog() -> GiftCatalog {
        GiftCatalog::new([
            vec![
                GiftEntry::new("100", "Timer"),
                GiftEntry::new("101", "Highlighters"),
                GiftEntry::new("102", "Notebook"),
            ],
            vec![GiftEntry::new("200", "Deck"), GiftEntry::new("201", "Workbook")],
            vec![GiftEntry::new("300", "Journal")],
        ])
    }

    fn controller() -> GiftController {
        let config = GiftConfig::new(Thresholds::new(4500, 6000, 8500).unwrap(), catalog());
        GiftController::new(config, GiftState::new_session(), false)
    }

    fn flatten(cmd: Cmd, out: &mut Vec<Cmd>) {
        match cmd {
            Cmd::None => {}
            Cmd::Batch(cmds) => cmds.into_iter().for_each(|c| flatten(c, out)),
            other => out.push(other),
        }
    }

    fn total(c: &mut GiftController, cents: u64) -> Vec<Cmd> {
        let mut out = Vec::new();
        let cmd = c.on_total(cents);
        flatten(cmd, &mut out);
        out
    }

    fn opened_tier(cmds: &[Cmd]) -> Option<Tier> {
        cmds.iter().find_map(|c| match c {
            Cmd::Emit(GiftEvent::PopupOpened { tier, .. }) => Some(*tier),
            _ => None,
        })
    }

    #[test]
    fn monotonic_climb_shows_each_tier_once_in_order() {
        let mut c = controller();
        assert_eq!(opened_tier(&total(&mut c, 0)), None);

        let cmds = total(&mut c, 5000);
        assert_eq!(opened_tier(&cmds), Some(Tier::One));
        c.update(Msg::Dismiss);

        let cmds = total(&mut c, 7000);
        assert_eq!(opened_tier(&cmds), Some(Tier::Two));
        c.update(Msg::Dismiss);

        let cmds = total(&mut c, 9000);
        assert_eq!(opened_tier(&cmds), Some(Tier::Three));
        c.update(Msg::Dismiss);

        // Re-delivering the same totals re-shows nothing.
        assert_eq!(opened_tier(&total(&mut c, 9000)), None);
    }

    #[test]
    fn single_jump_shows_only_highest_tier() {
        let mut c = controller();
        let cmds = total(&mut c, 9000);
        assert_eq!(opened_tier(&cmds), Some(Tier::Three));
        c.update(Msg::Dismiss);

        // The lower tiers were never shown but are covered by the
        // watermark; nothing re-fires on further evaluation.
        assert_eq!(opened_tier(&total(&mut c, 9100)), None);
    }

    #[test]
    fn duplicate_events_cannot_reshow_a_lower_tier() {
        let mut c = controller();
        let _ = total(&mut c, 9000);
        c.update(Msg::Dismiss);
        // A duplicate of the earlier tier-1 crossing arrives late.
        let cmds = total(&mut c, 5000);
        assert_eq!(opened_tier(&cmds), None);
    }

    #[test]
    fn skip_suppresses_all_further_popups() {
        let mut c = controller();
        let _ = total(&mut c, 5000);
        assert!(c.popup().is_some());
        let mut cmds = Vec::new();
        flatten(c.update(Msg::Skip), &mut cmds);
        assert!(cmds.iter().any(|cmd| matches!(cmd, Cmd::RecordSkip)));

        assert_eq!(opened_tier(&total(&mut c, 9000)), None);
        assert!(c.session_skipped());
    }

    #[test]
    fn manual_open_bypasses_skip_but_not_availability() {
        let mut c = controller();
        let _ = total(&mut c, 5000);
        let _ = c.update(Msg::Skip);

        let mut cmds = Vec::new();
        flatten(c.update(Msg::OpenRequested), &mut cmds);
        assert_eq!(opened_tier(&cmds), Some(Tier::One));
        assert!(c.popup().is_some());
    }

    #[test]
    fn worked_example_tier1_confirm() {
        // Thresholds {4500, 6000, 8500}; totals [0, 4500, 4500].
        let mut c = controller();
        let _ = total(&mut c, 0);
        let cmds = total(&mut c, 4500);
        assert_eq!(opened_tier(&cmds), Some(Tier::One));
        let popup = c.popup().unwrap();
        assert_eq!(popup.max_selectable(), 1);

        let _ = c.update(Msg::Toggle("100".into()));
        let mut cmds = Vec::new();
        flatten(c.update(Msg::Confirm), &mut cmds);
        let adds = cmds.iter().find_map(|cmd| match cmd {
            Cmd::AddGifts(reqs) => Some(reqs.clone()),
            _ => None,
        });
        assert_eq!(adds.unwrap()[0].variant_id, VariantId::new("100"));
        assert_eq!(
            c.state().selected.for_tier(Tier::One),
            std::slice::from_ref(&VariantId::new("100"))
        );

        // Third event: unchanged total, nothing new.
        assert_eq!(opened_tier(&total(&mut c, 4500)), None);
        assert_eq!(c.available_gifts(), 0);
    }

    #[test]
    fn popup_respects_selection_cap() {
        let mut c = controller();
        let _ = total(&mut c, 7000); // tier 2, two slots
        assert_eq!(c.popup().unwrap().max_selectable(), 2);
        let _ = c.update(Msg::Toggle("100".into()));
        let _ = c.update(Msg::Toggle("101".into()));
        let _ = c.update(Msg::Toggle("102".into()));
        assert_eq!(c.popup().unwrap().selected().len(), 2);
    }

    #[test]
    fn drop_below_tier1_removes_everything_and_reprompts_later() {
        let mut c = controller();
        let _ = total(&mut c, 5000);
        let _ = c.update(Msg::Toggle("100".into()));
        let _ = c.update(Msg::Confirm);

        let cmds = total(&mut c, 1000);
        let removed = cmds.iter().find_map(|cmd| match cmd {
            Cmd::RemoveGifts(ids) => Some(ids.clone()),
            _ => None,
        });
        assert_eq!(removed.unwrap(), vec![VariantId::new("100")]);
        assert_eq!(c.state().selected.count(), 0);
        assert_eq!(c.state().shown_watermark, None);

        // Re-crossing re-prompts.
        let cmds = total(&mut c, 5000);
        assert_eq!(opened_tier(&cmds), Some(Tier::One));
    }

    #[test]
    fn partial_drop_removes_only_higher_tiers() {
        let mut c = controller();
        let _ = total(&mut c, 9000); // tier 3 popup, 3 slots
        let _ = c.update(Msg::Toggle("100".into()));
        let _ = c.update(Msg::Toggle("200".into()));
        let _ = c.update(Msg::Toggle("300".into()));
        let _ = c.update(Msg::Confirm);
        assert_eq!(c.state().selected.for_tier(Tier::Three).len(), 3);

        // Falling to tier 1 strips tiers 2 and 3.
        let cmds = total(&mut c, 5000);
        let removed = cmds.iter().find_map(|cmd| match cmd {
            Cmd::RemoveGifts(ids) => Some(ids.clone()),
            _ => None,
        });
        // Selections were recorded under tier 3 (the confirming popup),
        // so they all count as above tier 1.
        assert_eq!(removed.unwrap().len(), 3);
        assert!(c.state().is_shown(Tier::One));
        assert!(!c.state().is_shown(Tier::Two));
    }

    #[test]
    fn second_popup_only_opens_after_first_closes() {
        let mut c = controller();
        let _ = total(&mut c, 5000);
        assert!(c.popup().is_some());
        // Tier 2 crossing while tier 1 popup is open: suppressed.
        let cmds = total(&mut c, 7000);
        assert_eq!(opened_tier(&cmds), None);
    }

    #[test]
    fn stale_popup_closes_when_tier_no_longer_eligible() {
        let mut c = controller();
        let _ = total(&mut c, 9000);
        assert_eq!(c.popup().unwrap().tier(), Tier::Three);
        let cmds = total(&mut c, 100);
        assert!(c.popup().is_none());
        assert!(
            cmds.iter()
                .any(|cmd| matches!(cmd, Cmd::Emit(GiftEvent::PopupClosed)))
        );
    }

    #[test]
    fn fetched_cart_reconciles_missing_gift_lines() {
        let mut c = controller();
        let _ = total(&mut c, 5000);
        let _ = c.update(Msg::Toggle("100".into()));
        let _ = c.update(Msg::Confirm);
        assert_eq!(c.available_gifts(), 0);

        // The reconciling fetch comes back without the gift line: the add
        // failed or the shopper removed it.
        let cart: CartSnapshot = serde_json::from_str(
            r#"{"total_price": 5000, "items":
                [{"variant_id": "900", "quantity": 1, "line_price": 5000}]}"#,
        )
        .unwrap();
        let _ = c.update(Msg::CartFetched(Ok(cart)));
        assert_eq!(c.state().selected.count(), 0);
        assert_eq!(c.available_gifts(), 1);
    }

    #[test]
    fn unchanged_event_total_skips_the_fetch() {
        let mut c = controller();
        let cart: CartSnapshot =
            serde_json::from_str(r#"{"total_price": 5000, "items": []}"#).unwrap();
        let _ = c.update(Msg::CartFetched(Ok(cart)));
        let cmd = c.update(Msg::Cart(CartEvent::Changed { total_cents: 5000 }));
        assert!(matches!(cmd, Cmd::None));
        let cmd = c.update(Msg::Cart(CartEvent::Changed { total_cents: 6000 }));
        assert!(matches!(cmd, Cmd::FetchCart { .. }));
    }

    proptest! {
        #[test]
        fn available_gifts_never_exceeds_eligible_slots(
            totals in proptest::collection::vec(0u64..12_000, 1..40)
        ) {
            let mut c = controller();
            for t in totals {
                let _ = total(&mut c, t);
                // Auto-select everything offered, sometimes.
                if t % 2 == 0 && c.popup().is_some() {
                    let ids: Vec<VariantId> = c
                        .popup()
                        .unwrap()
                        .offered()
                        .iter()
                        .map(|e| e.variant_id.clone())
                        .collect();
                    for id in ids {
                        let _ = c.update(Msg::Toggle(id));
                    }
                    let _ = c.update(Msg::Confirm);
                } else if c.popup().is_some() {
                    let _ = c.update(Msg::Dismiss);
                }
                let eligible = c.config().thresholds.eligible_slots(c.state().last_total_cents);
                prop_assert!(c.state().selected.count() <= eligible);
                prop_assert_eq!(
                    c.available_gifts(),
                    eligible.saturating_sub(c.state().selected.count())
                );
            }
        }
    }
}
