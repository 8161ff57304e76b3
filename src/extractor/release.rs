//! Release landing page: URL variants and merging cards across sources.

use std::collections::HashMap;
use url::Url;

use super::html::{cards_from_links, cards_from_payloads, release_cards};
use super::source::RenderedPage;
use crate::models::{ReleaseCard, ReleaseStatus};

/// The configured URL first, then its directory segments with hyphens and
/// encoded spaces swapped (`/whiskey-release/` vs `/whiskey%20release/`).
pub fn url_variants(page_url: &str) -> Vec<String> {
    let mut variants = vec![page_url.to_string()];
    let Ok(url) = Url::parse(page_url) else {
        return variants;
    };
    let Some(segments) = url.path_segments().map(|s| s.map(str::to_string).collect::<Vec<_>>()) else {
        return variants;
    };
    if segments.len() < 2 {
        return variants;
    }

    let swaps: [(&str, &str); 2] = [("%20", "-"), ("-", "%20")];
    for (from, to) in swaps {
        let last = segments.len() - 1;
        let path = segments
            .iter()
            .enumerate()
            .map(|(i, seg)| if i < last { seg.replace(from, to) } else { seg.clone() })
            .collect::<Vec<_>>()
            .join("/");
        let mut variant = url.clone();
        variant.set_path(&path);
        let variant = variant.to_string();
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants
}

/// Union of card lists keyed by stable key. The first occurrence wins,
/// except that a known status replaces an unknown one.
pub fn merge_cards<I>(sources: I) -> Vec<ReleaseCard>
where
    I: IntoIterator<Item = Vec<ReleaseCard>>,
{
    let mut merged: Vec<ReleaseCard> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for card in sources.into_iter().flatten() {
        match index.get(&card.key) {
            Some(&i) => {
                let existing = &mut merged[i];
                if existing.status == ReleaseStatus::Unknown && card.status != ReleaseStatus::Unknown {
                    existing.status = card.status;
                }
                if existing.image_url.is_none() {
                    existing.image_url = card.image_url;
                }
            }
            None => {
                index.insert(card.key.clone(), merged.len());
                merged.push(card);
            }
        }
    }
    merged
}

/// Cards from everything a page source captured: markup, live DOM anchors
/// and sniffed JSON.
pub fn cards_from_page(page: &RenderedPage, base_url: &str) -> Vec<ReleaseCard> {
    merge_cards([
        release_cards(&page.html, base_url),
        cards_from_links(&page.links, base_url),
        cards_from_payloads(&page.payloads, base_url),
    ])
}
