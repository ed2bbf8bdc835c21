//! Compatibility checks between products and container templates.
//!
//! Every check is evaluated independently so callers receive the full list of
//! problems instead of the first one. Problems are data, never errors.

use std::fmt;

use chrono::NaiveDate;

use crate::model::{ContainerTemplate, Product};
use crate::types::{OVERFILL_LIMIT, exceeds_weight_limit};

/// A single reason why a product does not belong into a container.
#[derive(Clone, Debug, PartialEq)]
pub enum CompatibilityIssue {
    UnsupportedFormFactor {
        form_factor_id: String,
    },
    MissingCapabilities {
        missing: Vec<String>,
    },
    DestinationMismatch {
        product: String,
        container: String,
    },
    WeightLimitExceeded {
        total: f64,
        limit: f64,
    },
    NotReadyBeforeDeparture {
        ready: NaiveDate,
        departure: NaiveDate,
    },
    MissesShipDeadline {
        deadline: NaiveDate,
        departure: NaiveDate,
    },
    MissesArrivalDeadline {
        deadline: NaiveDate,
        arrival: NaiveDate,
    },
}

impl CompatibilityIssue {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CompatibilityIssue::UnsupportedFormFactor { .. } => "unsupported_form_factor",
            CompatibilityIssue::MissingCapabilities { .. } => "missing_capabilities",
            CompatibilityIssue::DestinationMismatch { .. } => "destination_mismatch",
            CompatibilityIssue::WeightLimitExceeded { .. } => "weight_limit_exceeded",
            CompatibilityIssue::NotReadyBeforeDeparture { .. } => "not_ready_before_departure",
            CompatibilityIssue::MissesShipDeadline { .. } => "misses_ship_deadline",
            CompatibilityIssue::MissesArrivalDeadline { .. } => "misses_arrival_deadline",
        }
    }
}

impl fmt::Display for CompatibilityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityIssue::UnsupportedFormFactor { form_factor_id } => {
                write!(f, "Unsupported form factor '{}'", form_factor_id)
            }
            CompatibilityIssue::MissingCapabilities { missing } => {
                write!(f, "Missing capabilities: {}", missing.join(", "))
            }
            CompatibilityIssue::DestinationMismatch { product, container } => write!(
                f,
                "Destination mismatch: product goes to '{}', container to '{}'",
                product, container
            ),
            CompatibilityIssue::WeightLimitExceeded { total, limit } => write!(
                f,
                "Weight limit exceeded: {:.2} kg > {:.2} kg",
                total, limit
            ),
            CompatibilityIssue::NotReadyBeforeDeparture { ready, departure } => write!(
                f,
                "Container departs {} before cargo is ready on {}",
                departure, ready
            ),
            CompatibilityIssue::MissesShipDeadline {
                deadline,
                departure,
            } => write!(
                f,
                "Container departs {} after ship deadline {}",
                departure, deadline
            ),
            CompatibilityIssue::MissesArrivalDeadline { deadline, arrival } => write!(
                f,
                "Container arrives {} after arrival deadline {}",
                arrival, deadline
            ),
        }
    }
}

/// Checks a product against a container template.
///
/// # Parameters
/// * `product` - The line to place
/// * `template` - The candidate container
/// * `existing_weight` - Weight already loaded into the container
/// * `weight_limit` - Effective weight limit, `None` for unlimited
///
/// # Returns
/// All issues found; an empty list means the product may be placed.
pub fn check_compatibility(
    product: &Product,
    template: &ContainerTemplate,
    existing_weight: f64,
    weight_limit: Option<f64>,
) -> Vec<CompatibilityIssue> {
    let mut issues = Vec::new();
    form_factor_issue(product, template, &mut issues);
    capability_issue(product, template, &mut issues);
    destination_issue(product, template, &mut issues);
    if let (Some(limit), Some(weight)) = (weight_limit, product.weight) {
        let total = existing_weight + weight;
        if exceeds_weight_limit(total, limit) {
            issues.push(CompatibilityIssue::WeightLimitExceeded { total, limit });
        }
    }
    date_issues(product, template, &mut issues);
    issues
}

/// Like `check_compatibility`, without the weight check.
///
/// Used when weight is judged per container rather than per product.
pub fn check_placement(product: &Product, template: &ContainerTemplate) -> Vec<CompatibilityIssue> {
    check_compatibility(product, template, 0.0, None)
}

/// Checks whether a whole set of products may move into a template.
///
/// Every product must support the form factor, capabilities and destination
/// of the template; the summed capacity share must stay at or below 100.1 %
/// and the total weight within the limit.
pub fn can_fit(products: &[Product], template: &ContainerTemplate, weight_limit: Option<f64>) -> bool {
    can_fit_within(products, template, weight_limit, OVERFILL_LIMIT)
}

/// `can_fit` with an explicit utilization ceiling in percent.
pub fn can_fit_within(
    products: &[Product],
    template: &ContainerTemplate,
    weight_limit: Option<f64>,
    utilization_ceiling: f64,
) -> bool {
    let mut utilization = 0.0;
    let mut total_weight = 0.0;
    for product in products {
        let mut issues = Vec::new();
        form_factor_issue(product, template, &mut issues);
        capability_issue(product, template, &mut issues);
        destination_issue(product, template, &mut issues);
        if !issues.is_empty() {
            return false;
        }
        let Some(share) = template.unit_share(&product.form_factor_id) else {
            return false;
        };
        utilization += share * product.quantity as f64;
        total_weight += product.effective_weight();
    }
    if utilization > utilization_ceiling {
        return false;
    }
    match weight_limit {
        Some(limit) => !exceeds_weight_limit(total_weight, limit),
        None => true,
    }
}

fn form_factor_issue(
    product: &Product,
    template: &ContainerTemplate,
    issues: &mut Vec<CompatibilityIssue>,
) {
    if template.capacity_for(&product.form_factor_id).is_none() {
        issues.push(CompatibilityIssue::UnsupportedFormFactor {
            form_factor_id: product.form_factor_id.clone(),
        });
    }
}

fn capability_issue(
    product: &Product,
    template: &ContainerTemplate,
    issues: &mut Vec<CompatibilityIssue>,
) {
    let required = product.normalized_restrictions();
    if required.is_empty() {
        return;
    }
    let offered = template.normalized_restrictions();
    let missing: Vec<String> = required.difference(&offered).cloned().collect();
    if !missing.is_empty() {
        issues.push(CompatibilityIssue::MissingCapabilities { missing });
    }
}

fn destination_issue(
    product: &Product,
    template: &ContainerTemplate,
    issues: &mut Vec<CompatibilityIssue>,
) {
    let container = template.normalized_destination();
    if container.is_empty() {
        return;
    }
    let wanted = product.normalized_destination();
    if wanted != container {
        issues.push(CompatibilityIssue::DestinationMismatch {
            product: wanted,
            container,
        });
    }
}

fn date_issues(product: &Product, template: &ContainerTemplate, issues: &mut Vec<CompatibilityIssue>) {
    let Some(departure) = template.departure() else {
        return;
    };
    if let Some(ready) = product.ready() {
        if ready > departure {
            issues.push(CompatibilityIssue::NotReadyBeforeDeparture { ready, departure });
        }
    }
    if let Some(deadline) = product.ship_deadline_date() {
        if deadline < departure {
            issues.push(CompatibilityIssue::MissesShipDeadline {
                deadline,
                departure,
            });
        }
    }
    if let (Some(deadline), Some(arrival)) = (product.arrival_deadline_date(), template.arrival()) {
        if deadline < arrival {
            issues.push(CompatibilityIssue::MissesArrivalDeadline { deadline, arrival });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ibc(qty: u64) -> Product {
        Product::new("p-1", "Solvent", "IBC1000", qty)
            .unwrap()
            .with_destination("DE")
    }

    fn template() -> ContainerTemplate {
        ContainerTemplate::new("t1", "Box")
            .with_capacity("IBC1000", 10)
            .with_destination("de")
            .with_cost(100.0)
    }

    #[test]
    fn compatible_product_has_no_issues() {
        assert!(check_compatibility(&ibc(4), &template(), 0.0, None).is_empty());
    }

    #[test]
    fn reports_unsupported_form_factor() {
        let product = Product::new("p", "Drum", "DRUM200", 1)
            .unwrap()
            .with_destination("DE");
        let issues = check_placement(&product, &template());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "unsupported_form_factor");
    }

    #[test]
    fn reports_missing_capabilities_normalized() {
        let product = ibc(1)
            .with_restriction(" Hazmat ")
            .with_restriction("REEFER");
        let container = template().with_restriction("hazmat");
        let issues = check_placement(&product, &container);
        assert_eq!(
            issues,
            vec![CompatibilityIssue::MissingCapabilities {
                missing: vec!["reefer".to_string()]
            }]
        );
        let full = container.with_restriction("Reefer ");
        assert!(check_placement(&product, &full).is_empty());
    }

    #[test]
    fn empty_container_destination_is_wildcard() {
        let wildcard = template().with_destination("");
        let product = ibc(1).with_destination("FR");
        assert!(check_placement(&product, &wildcard).is_empty());
        let issues = check_placement(&product, &template());
        assert_eq!(issues[0].code(), "destination_mismatch");
    }

    #[test]
    fn reports_weight_with_both_values() {
        let product = ibc(1).with_weight(600.0);
        let issues = check_compatibility(&product, &template(), 500.0, Some(1000.0));
        assert_eq!(
            issues,
            vec![CompatibilityIssue::WeightLimitExceeded {
                total: 1100.0,
                limit: 1000.0
            }]
        );
        assert!(issues[0].to_string().contains("1100.00"));
        assert!(issues[0].to_string().contains("1000.00"));
        assert!(check_compatibility(&product, &template(), 400.0, Some(1000.0)).is_empty());
    }

    #[test]
    fn reports_all_date_violations() {
        let container = template()
            .with_available_from("2024-05-10")
            .with_transit_time_days(10);
        let product = ibc(1)
            .with_ready_date("2024-05-12")
            .with_ship_deadline("2024-05-08")
            .with_arrival_deadline("2024-05-15");
        let codes: Vec<_> = check_placement(&product, &container)
            .iter()
            .map(|issue| issue.code())
            .collect();
        assert_eq!(
            codes,
            vec![
                "not_ready_before_departure",
                "misses_ship_deadline",
                "misses_arrival_deadline"
            ]
        );
    }

    #[test]
    fn unparseable_dates_are_ignored() {
        let container = template().with_available_from("next week");
        let product = ibc(1).with_ready_date("2099-01-01");
        assert!(check_placement(&product, &container).is_empty());

        let dated = template().with_available_from("2024-05-10");
        let garbled = ibc(1).with_ready_date("tomorrow-ish");
        assert!(check_placement(&garbled, &dated).is_empty());
    }

    #[test]
    fn issues_are_not_short_circuited() {
        let product = Product::new("p", "Drum", "DRUM200", 1)
            .unwrap()
            .with_destination("FR")
            .with_restriction("hazmat");
        assert_eq!(check_placement(&product, &template()).len(), 3);
    }

    #[test]
    fn can_fit_checks_capacity_and_weight() {
        let container = template();
        assert!(can_fit(&[ibc(6), ibc(4)], &container, None));
        assert!(!can_fit(&[ibc(6), ibc(5)], &container, None));

        let heavy = vec![ibc(2).with_weight(800.0), ibc(2).with_weight(300.0)];
        assert!(can_fit(&heavy, &container, Some(1100.0)));
        assert!(!can_fit(&heavy, &container, Some(1000.0)));
    }

    #[test]
    fn can_fit_rejects_incompatible_members() {
        let container = template();
        let restricted = ibc(1).with_restriction("hazmat");
        assert!(!can_fit(&[ibc(1), restricted], &container, None));
        assert!(can_fit(&[], &container, None));
    }

    #[test]
    fn can_fit_within_honours_ceiling() {
        let container = template();
        assert!(can_fit_within(&[ibc(8)], &container, None, 80.1));
        assert!(!can_fit_within(&[ibc(9)], &container, None, 80.1));
    }
}
