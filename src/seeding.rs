//! Reconstruction of booked containers from hard current assignments.
//!
//! Products carrying a hard assignment are grouped by
//! `(container description, destination, reference)`; each group becomes one
//! pinned instance whose template is found by fuzzy-matching the description.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::model::{ContainerTemplate, Product};
use crate::packer::{IdSequence, InstanceLoad};
use crate::types::normalize_destination;

/// Identity of one booked container.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeedKey {
    pub container: String,
    /// Normalized destination of the booked products.
    pub destination: String,
    pub reference: String,
}

/// A booked container rebuilt as a pinned instance.
#[derive(Clone, Debug, PartialEq)]
pub struct SeededInstance {
    pub key: SeedKey,
    pub load: InstanceLoad,
}

impl SeededInstance {
    /// Earliest `shipping_available_by` date of the booked products.
    pub fn shipping_date(&self) -> Option<NaiveDate> {
        self.load
            .assigned
            .iter()
            .filter_map(Product::shipping_available_date)
            .min()
    }
}

/// Products split into booked containers and products still to be packed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Seeding {
    pub seeded: Vec<SeededInstance>,
    pub remaining: Vec<Product>,
}

/// Partitions products with hard assignments into pinned instances.
///
/// Bookings whose description matches no template are not dropped; their
/// products are packed like any other product.
pub fn seed_current_assignments(
    products: Vec<Product>,
    templates: &[ContainerTemplate],
    ids: &mut IdSequence,
) -> Seeding {
    let mut bookings: Vec<(SeedKey, Vec<Product>)> = Vec::new();
    let mut index: BTreeMap<SeedKey, usize> = BTreeMap::new();
    let mut remaining = Vec::new();

    for product in products {
        let key = product
            .current_assignment
            .as_ref()
            .filter(|assignment| assignment.is_hard())
            .map(|assignment| SeedKey {
                container: assignment.container.trim().to_string(),
                destination: product.normalized_destination(),
                reference: assignment.reference.trim().to_string(),
            });
        let Some(key) = key else {
            remaining.push(product);
            continue;
        };
        let slot = match index.get(&key) {
            Some(slot) => *slot,
            None => {
                index.insert(key.clone(), bookings.len());
                bookings.push((key, Vec::new()));
                bookings.len() - 1
            }
        };
        bookings[slot].1.push(product);
    }

    let mut seeded = Vec::new();
    for (key, members) in bookings {
        match match_template(&key.container, &key.destination, templates) {
            Some(template) => {
                let mut load = InstanceLoad::pinned(template.instantiate(ids.next_instance_id()));
                for product in members {
                    load.push(product);
                }
                debug!(
                    instance = %load.instance.id,
                    template = %template.id,
                    reference = %key.reference,
                    products = load.assigned.len(),
                    "seeded booked container"
                );
                seeded.push(SeededInstance { key, load });
            }
            None => {
                warn!(
                    container = %key.container,
                    reference = %key.reference,
                    "no template matches booked container, packing its products freely"
                );
                remaining.extend(members);
            }
        }
    }

    Seeding { seeded, remaining }
}

/// Finds the template a free-text container description refers to.
///
/// Tries, in order: exact id, exact name, then the longest template name
/// contained in (or containing) the description. Comparisons ignore case,
/// whitespace and punctuation; templates serving `destination` win ties.
pub fn match_template<'a>(
    description: &str,
    destination: &str,
    templates: &'a [ContainerTemplate],
) -> Option<&'a ContainerTemplate> {
    let needle = fold(description);
    if needle.is_empty() {
        return None;
    }
    let destination = normalize_destination(destination);
    let serves = |template: &ContainerTemplate| {
        let served = template.normalized_destination();
        served.is_empty() || served == destination
    };
    let ordered: Vec<&ContainerTemplate> = templates
        .iter()
        .filter(|&t| serves(t))
        .chain(templates.iter().filter(|&t| !serves(t)))
        .collect();

    if let Some(template) = ordered.iter().copied().find(|t| fold(&t.id) == needle) {
        return Some(template);
    }
    if let Some(template) = ordered.iter().copied().find(|t| fold(&t.name) == needle) {
        return Some(template);
    }

    let mut best: Option<(&ContainerTemplate, usize)> = None;
    for template in ordered {
        let name = fold(&template.name);
        if name.is_empty() || !(needle.contains(&name) || name.contains(&needle)) {
            continue;
        }
        if best.is_none_or(|(_, len)| name.len() > len) {
            best = Some((template, name.len()));
        }
    }
    best.map(|(template, _)| template)
}

fn fold(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssignmentKind, CurrentAssignment};

    fn templates() -> Vec<ContainerTemplate> {
        vec![
            ContainerTemplate::new("t-20", "20ft Standard").with_capacity("IBC1000", 10),
            ContainerTemplate::new("t-40", "40ft Standard").with_capacity("IBC1000", 20),
            ContainerTemplate::new("t-40hc", "40ft Standard HC").with_capacity("IBC1000", 22),
        ]
    }

    fn booked(id: &str, container: &str, reference: &str, kind: AssignmentKind) -> Product {
        Product::new(id, id, "IBC1000", 2)
            .unwrap()
            .with_destination("DE")
            .with_current_assignment(CurrentAssignment {
                container: container.to_string(),
                reference: reference.to_string(),
                kind,
            })
    }

    #[test]
    fn matches_by_id_name_and_containment() {
        let templates = templates();
        assert_eq!(match_template("T-40", "", &templates).unwrap().id, "t-40");
        assert_eq!(
            match_template("20FT standard", "", &templates).unwrap().id,
            "t-20"
        );
        assert_eq!(
            match_template("1x 40ft Standard HC (booked)", "", &templates)
                .unwrap()
                .id,
            "t-40hc"
        );
        assert!(match_template("reefer", "", &templates).is_none());
        assert!(match_template("  ", "", &templates).is_none());
    }

    #[test]
    fn prefers_template_serving_destination() {
        let templates = vec![
            ContainerTemplate::new("a", "Flexitank").with_destination("FR"),
            ContainerTemplate::new("b", "Flexitank").with_destination("DE"),
        ];
        assert_eq!(match_template("flexitank", "de", &templates).unwrap().id, "b");
    }

    #[test]
    fn groups_hard_bookings_by_reference() {
        let products = vec![
            booked("a", "40ft Standard", "BK-1", AssignmentKind::Hard),
            booked("b", "40ft Standard", "BK-2", AssignmentKind::Hard),
            booked("c", "40ft Standard", "BK-1", AssignmentKind::Hard),
            booked("d", "40ft Standard", "BK-3", AssignmentKind::Suggested),
            Product::new("e", "e", "IBC1000", 1).unwrap(),
        ];
        let mut ids = IdSequence::new();
        let seeding = seed_current_assignments(products, &templates(), &mut ids);

        assert_eq!(seeding.seeded.len(), 2);
        let first = &seeding.seeded[0];
        assert_eq!(first.key.reference, "BK-1");
        assert_eq!(first.load.instance.id, "container-1");
        assert!(first.load.pinned);
        assert_eq!(first.load.assigned.len(), 2);
        assert!((first.load.utilization - 20.0).abs() < 1e-9);
        let remaining: Vec<_> = seeding.remaining.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(remaining, vec!["d", "e"]);
    }

    #[test]
    fn unmatched_bookings_fall_back_to_packing() {
        let products = vec![booked("a", "Mystery box", "BK-1", AssignmentKind::Hard)];
        let seeding = seed_current_assignments(products, &templates(), &mut IdSequence::new());
        assert!(seeding.seeded.is_empty());
        assert_eq!(seeding.remaining.len(), 1);
    }
}
