//! Classifies fresh observations against the stored snapshot.

use std::collections::{HashMap, HashSet};

use crate::config::SweepConfig;
use crate::models::{CatalogEvent, EventKind, Product};

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    pub restock_events: bool,
    pub removed_events: bool,
    /// Cap applied to the new list and to the restocked list, 0 = unlimited.
    pub max_notify: usize,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self {
            restock_events: true,
            removed_events: false,
            max_notify: 0,
        }
    }
}

/// Outcome of one diff, in fresh-snapshot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub new: Vec<Product>,
    pub restocked: Vec<Product>,
    pub removed: Vec<Product>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.restocked.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.restocked.len() + self.removed.len()
    }

    /// New, then restocked, then removed.
    pub fn events(&self) -> Vec<CatalogEvent> {
        let new = self.new.iter().map(|p| CatalogEvent::product(EventKind::New, p.clone()));
        let restocked = self
            .restocked
            .iter()
            .map(|p| CatalogEvent::product(EventKind::Available, p.clone()));
        let removed = self
            .removed
            .iter()
            .map(|p| CatalogEvent::product(EventKind::Removed, p.clone()));
        new.chain(restocked).chain(removed).collect()
    }

    /// Products whose notification may still be improved by enrichment.
    pub fn notified_mut(&mut self) -> impl Iterator<Item = &mut Product> {
        self.new.iter_mut().chain(self.restocked.iter_mut())
    }
}

impl ChangeDetector {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            restock_events: config.restock_events,
            removed_events: config.removed_events,
            max_notify: config.max_notify,
        }
    }

    /// A non-positive fresh price inherits the prior positive one.
    pub fn carry_forward_prices(prior: &HashMap<String, Product>, fresh: &mut [Product]) {
        for product in fresh.iter_mut().filter(|p| !p.has_price()) {
            if let Some(known) = prior.get(&product.id).filter(|p| p.has_price()) {
                product.price = known.price;
            }
        }
    }

    /// New and restocked items of `fresh`; carries prices forward first.
    /// Uncapped: callers drop already-announced items, then [`ChangeDetector::cap`].
    /// Removal is not judged here, see [`ChangeDetector::detect_removed`].
    pub fn diff(&self, prior: &HashMap<String, Product>, fresh: &mut [Product]) -> ChangeSet {
        Self::carry_forward_prices(prior, fresh);

        let mut changes = ChangeSet::default();
        for product in fresh.iter() {
            match prior.get(&product.id) {
                None => changes.new.push(product.clone()),
                Some(before) if self.restock_events && !before.in_stock() && product.in_stock() => {
                    changes.restocked.push(product.clone())
                }
                Some(_) => {}
            }
        }

        changes
    }

    /// Truncates the new and the restocked lists to `max_notify` each,
    /// keeping their order.
    pub fn cap(&self, changes: &mut ChangeSet) {
        if self.max_notify > 0 {
            changes.new.truncate(self.max_notify);
            changes.restocked.truncate(self.max_notify);
        }
    }

    /// Listed rows of the prior snapshot that a complete sweep no longer
    /// returns. Empty unless removal events are enabled.
    pub fn detect_removed(
        &self,
        prior: &HashMap<String, Product>,
        observed: &HashSet<String>,
    ) -> Vec<Product> {
        if !self.removed_events {
            return Vec::new();
        }
        let mut removed: Vec<Product> = prior
            .values()
            .filter(|p| !p.removed && !observed.contains(&p.id))
            .cloned()
            .collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        removed
    }
}
