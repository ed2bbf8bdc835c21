//! Partitioning of products into destination and shipping-date groups.
//!
//! Groups are returned in a deterministic order: destinations in order of
//! first appearance, and within a destination the date windows in ascending
//! date order followed by the products without a usable date.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

use crate::model::Product;
use crate::types::UNKNOWN_DESTINATION;

/// Date sub-partition of a destination group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateBucket {
    /// Date grouping disabled; the whole destination is one group.
    All,
    /// The n-th date window (0-based, ascending by date).
    Window(usize),
    /// Products without a parseable `shipping_available_by`.
    Undated,
}

/// Identity of a product group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    /// Normalized destination, `None` for products without one.
    pub destination: Option<String>,
    pub bucket: DateBucket,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destination = self.destination.as_deref().unwrap_or(UNKNOWN_DESTINATION);
        match self.bucket {
            DateBucket::All => write!(f, "{}", destination),
            DateBucket::Window(index) => write!(f, "{}#window-{}", destination, index),
            DateBucket::Undated => write!(f, "{}#undated", destination),
        }
    }
}

/// Products packed together in one pass of the packer.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductGroup {
    pub key: GroupKey,
    /// Normalized destination used to select templates (empty for unknown).
    pub destination: String,
    /// Earliest `shipping_available_by` date of a date window.
    pub window_start: Option<NaiveDate>,
    pub products: Vec<Product>,
}

impl ProductGroup {
    /// Whether a booked container dated `date` belongs to this group.
    ///
    /// Undated bookings go to the undated bucket; dated ones to the window
    /// whose range covers their date.
    pub fn covers(
        &self,
        destination: &str,
        date: Option<NaiveDate>,
        range_days: Option<u32>,
    ) -> bool {
        if self.destination != destination {
            return false;
        }
        match (self.key.bucket, date) {
            (DateBucket::All, _) => true,
            (DateBucket::Undated, None) => true,
            (DateBucket::Window(_), Some(date)) => match (self.window_start, range_days) {
                (Some(start), Some(range)) => {
                    date >= start && (date - start).num_days() <= range as i64
                }
                _ => false,
            },
            _ => false,
        }
    }
}

/// Splits products into destination groups and, optionally, date windows.
///
/// # Parameters
/// * `products` - Products to partition; ownership moves into the groups
/// * `range_days` - Maximum distance in days from a window's earliest date
pub fn group_products(products: Vec<Product>, range_days: Option<u32>) -> Vec<ProductGroup> {
    let mut order: Vec<(Option<String>, Vec<Product>)> = Vec::new();
    let mut index: BTreeMap<Option<String>, usize> = BTreeMap::new();

    for product in products {
        let normalized = product.normalized_destination();
        let destination = (!normalized.is_empty()).then_some(normalized);
        let slot = *index.entry(destination.clone()).or_insert_with(|| {
            order.push((destination, Vec::new()));
            order.len() - 1
        });
        order[slot].1.push(product);
    }

    let mut groups = Vec::new();
    for (destination, members) in order {
        let plain = destination.clone().unwrap_or_default();
        match range_days {
            None => groups.push(ProductGroup {
                key: GroupKey {
                    destination,
                    bucket: DateBucket::All,
                },
                destination: plain,
                window_start: None,
                products: members,
            }),
            Some(range) => {
                for (bucket, window_start, products) in split_by_date(members, range) {
                    groups.push(ProductGroup {
                        key: GroupKey {
                            destination: destination.clone(),
                            bucket,
                        },
                        destination: plain.clone(),
                        window_start,
                        products,
                    });
                }
            }
        }
    }
    groups
}

fn split_by_date(
    members: Vec<Product>,
    range_days: u32,
) -> Vec<(DateBucket, Option<NaiveDate>, Vec<Product>)> {
    let mut dated: Vec<(NaiveDate, Product)> = Vec::new();
    let mut undated: Vec<Product> = Vec::new();
    for product in members {
        match product.shipping_available_date() {
            Some(date) => dated.push((date, product)),
            None => undated.push(product),
        }
    }
    dated.sort_by_key(|(date, _)| *date);

    let mut buckets = Vec::new();
    let mut current: Vec<Product> = Vec::new();
    let mut window_start: Option<NaiveDate> = None;
    for (date, product) in dated {
        match window_start {
            Some(start) if (date - start).num_days() > range_days as i64 => {
                let index = buckets.len();
                buckets.push((
                    DateBucket::Window(index),
                    Some(start),
                    std::mem::take(&mut current),
                ));
                window_start = Some(date);
            }
            Some(_) => {}
            None => window_start = Some(date),
        }
        current.push(product);
    }
    if !current.is_empty() {
        let index = buckets.len();
        buckets.push((DateBucket::Window(index), window_start, current));
    }
    if !undated.is_empty() {
        buckets.push((DateBucket::Undated, None, undated));
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, destination: &str) -> Product {
        Product::new(id, id, "IBC1000", 1)
            .unwrap()
            .with_destination(destination)
    }

    fn ids(group: &ProductGroup) -> Vec<&str> {
        group.products.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn groups_by_normalized_destination_in_first_seen_order() {
        let groups = group_products(
            vec![
                product("a", "FR"),
                product("b", " de "),
                product("c", "fr"),
                product("d", ""),
                product("e", "DE"),
            ],
            None,
        );
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].destination, "fr");
        assert_eq!(ids(&groups[0]), vec!["a", "c"]);
        assert_eq!(groups[1].destination, "de");
        assert_eq!(ids(&groups[1]), vec!["b", "e"]);
        assert_eq!(groups[2].key.destination, None);
        assert_eq!(groups[2].destination, "");
        assert_eq!(groups[2].key.to_string(), "unknown");
    }

    #[test]
    fn literal_unknown_destination_does_not_merge_with_missing_one() {
        let groups = group_products(vec![product("a", "unknown"), product("b", "  ")], None);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn clusters_dates_from_window_start() {
        let groups = group_products(
            vec![
                product("late", "DE").with_shipping_available_by("2024-05-20"),
                product("first", "DE").with_shipping_available_by("2024-05-01"),
                product("edge", "DE").with_shipping_available_by("2024-05-04"),
                product("next", "DE").with_shipping_available_by("2024-05-05"),
                product("next2", "DE").with_shipping_available_by("2024-05-06"),
            ],
            Some(3),
        );
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key.bucket, DateBucket::Window(0));
        assert_eq!(ids(&groups[0]), vec!["first", "edge"]);
        assert_eq!(groups[1].key.bucket, DateBucket::Window(1));
        assert_eq!(ids(&groups[1]), vec!["next", "next2"]);
        assert_eq!(ids(&groups[2]), vec!["late"]);
    }

    #[test]
    fn undated_products_get_their_own_bucket() {
        let groups = group_products(
            vec![
                product("nodate", "DE"),
                product("dated", "DE").with_shipping_available_by("2024-05-01"),
                product("garbled", "DE").with_shipping_available_by("whenever"),
            ],
            Some(7),
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["dated"]);
        assert_eq!(groups[1].key.bucket, DateBucket::Undated);
        assert_eq!(ids(&groups[1]), vec!["nodate", "garbled"]);
        assert_eq!(groups[1].key.to_string(), "de#undated");
    }

    #[test]
    fn zero_range_splits_distinct_days() {
        let groups = group_products(
            vec![
                product("a", "DE").with_shipping_available_by("2024-05-01"),
                product("b", "DE").with_shipping_available_by("2024-05-01"),
                product("c", "DE").with_shipping_available_by("2024-05-02"),
            ],
            Some(0),
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["a", "b"]);
    }

    #[test]
    fn windows_cover_bookings_within_their_range() {
        let groups = group_products(
            vec![
                product("early", "DE").with_shipping_available_by("2024-06-01"),
                product("late", "DE").with_shipping_available_by("2024-06-20"),
                product("open", "DE"),
            ],
            Some(3),
        );
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 6, d);
        assert_eq!(groups[0].window_start, day(1));
        assert!(groups[0].covers("de", day(4), Some(3)));
        assert!(!groups[0].covers("de", day(20), Some(3)));
        assert!(!groups[0].covers("fr", day(1), Some(3)));
        assert!(groups[1].covers("de", day(21), Some(3)));
        assert!(!groups[1].covers("de", None, Some(3)));
        assert!(groups[2].covers("de", None, Some(3)));
        assert!(!groups[2].covers("de", day(20), Some(3)));

        let plain = group_products(vec![product("x", "DE")], None);
        assert!(plain[0].covers("de", day(20), None));
    }
}
