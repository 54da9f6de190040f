// src/rotation.rs
//! Weekly product-search rotation and the price/block-list filter applied to
//! what the search returns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fingerprint::hash_u32;
use crate::quota::week_label;

/// Stride between picked pool slots.
const STRIDE: u64 = 101;

pub fn default_query_pool() -> Vec<String> {
    [
        "cucina utensile insolito",
        "organizzatore scrivania strano",
        "gadget casa intelligente semplice",
        "attrezzo manuale particolare",
        "accessorio bagno insolito",
        "luce lampada design funzionale",
        "supporto telefono scrivania strano",
        "apribottiglie insolito",
        "tagliaverdure particolare",
        "misurino cucina strano",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Pick `count` queries for the ISO week containing `date`.
/// `seed = hash_u32(week_label)`, slot `i` = `(seed + i*101) mod pool.len()`.
/// Same week, same list; picks may repeat when the stride aliases the pool size.
pub fn pick_queries(date: NaiveDate, count: usize, pool: &[String]) -> Vec<String> {
    if pool.is_empty() {
        return Vec::new();
    }
    let seed = hash_u32(&week_label(date)) as u64;
    let n = pool.len() as u64;
    (0..count as u64)
        .map(|i| pool[((seed + i * STRIDE) % n) as usize].clone())
        .collect()
}

/// Block-list + inclusive price band for product-search hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub block: Vec<String>,
    pub price_min: f64,
    pub price_max: f64,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            block: [
                "regalo divertente",
                "scherzo",
                "prank",
                "sexy",
                "adult",
                "costume",
                "halloween",
                "porn",
                "nft",
                "crypto",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            price_min: 5.0,
            price_max: 25.0,
        }
    }
}

impl ProductFilter {
    pub fn accepts(&self, title: &str, price: Option<f64>) -> bool {
        let t = title.trim().to_lowercase();
        if t.is_empty() {
            return false;
        }
        if self.block.iter().any(|b| t.contains(&b.to_lowercase())) {
            return false;
        }
        match price {
            Some(p) if p.is_finite() => p >= self.price_min && p <= self.price_max,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    #[test]
    fn picks_are_stable_within_a_week_and_move_across_weeks() {
        let pool = default_query_pool();
        let monday = pick_queries(d(2026, 10, 12), 3, &pool);
        let sunday = pick_queries(d(2026, 10, 18), 3, &pool);
        assert_eq!(monday, sunday);
        assert_eq!(
            monday,
            vec![
                "attrezzo manuale particolare",
                "accessorio bagno insolito",
                "luce lampada design funzionale",
            ]
        );
        let next = pick_queries(d(2026, 10, 19), 3, &pool);
        assert_eq!(
            next,
            vec![
                "accessorio bagno insolito",
                "luce lampada design funzionale",
                "supporto telefono scrivania strano",
            ]
        );
    }

    #[test]
    fn empty_pool_or_zero_count() {
        assert!(pick_queries(d(2026, 10, 16), 3, &[]).is_empty());
        assert!(pick_queries(d(2026, 10, 16), 0, &default_query_pool()).is_empty());
    }

    #[test]
    fn price_band_is_inclusive_and_required() {
        let f = ProductFilter::default();
        assert!(f.accepts("Apribottiglie a forma di pesce", Some(5.0)));
        assert!(f.accepts("Apribottiglie a forma di pesce", Some(25.0)));
        assert!(!f.accepts("Apribottiglie a forma di pesce", Some(4.99)));
        assert!(!f.accepts("Apribottiglie a forma di pesce", Some(25.01)));
        assert!(!f.accepts("Apribottiglie a forma di pesce", None));
        assert!(!f.accepts("   ", Some(10.0)));
        assert!(!f.accepts("Costume da Halloween", Some(10.0)));
        assert!(!f.accepts("Tazza CRYPTO moon", Some(10.0)));
    }
}
