//! Derivation of finalized containers and their validation issues.
//!
//! `finalize` is the only way a `LoadedContainer` is built, both at the end of
//! an optimization run and after a manual move of products between containers.

use std::fmt;

use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::compat::{CompatibilityIssue, check_placement};
use crate::model::{ContainerInstance, LoadedContainer, Product};
use crate::types::{exceeds_weight_limit, overfill_threshold};

/// Limits applied while finalizing a container.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, ToSchema)]
pub struct FinalizeOptions {
    /// Effective weight limit of the container, `None` for unlimited.
    #[serde(default)]
    pub weight_limit: Option<f64>,
    /// Allowed spread of `shipping_available_by` dates in days.
    #[serde(default)]
    pub shipping_date_grouping_range_days: Option<u32>,
    /// Packing ceiling in percent; defaults to 100.
    #[serde(default)]
    pub max_utilization: Option<f64>,
}

/// Something wrong with a finalized container.
#[derive(Clone, Debug, PartialEq)]
pub enum ContainerIssue {
    Product {
        product_id: String,
        name: String,
        issue: CompatibilityIssue,
    },
    Overfilled {
        utilization: f64,
        threshold: f64,
    },
    WeightLimitExceeded {
        total: f64,
        limit: f64,
    },
    ShippingDatesSpread {
        earliest: NaiveDate,
        latest: NaiveDate,
        allowed_days: u32,
    },
}

impl fmt::Display for ContainerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerIssue::Product {
                product_id,
                name,
                issue,
            } => write!(f, "{} ({}): {}", name, product_id, issue),
            ContainerIssue::Overfilled {
                utilization,
                threshold,
            } => write!(
                f,
                "Overfilled: {:.1}% of capacity used (limit {:.1}%)",
                utilization, threshold
            ),
            ContainerIssue::WeightLimitExceeded { total, limit } => write!(
                f,
                "Weight limit exceeded: {:.2} kg > {:.2} kg",
                total, limit
            ),
            ContainerIssue::ShippingDatesSpread {
                earliest,
                latest,
                allowed_days,
            } => write!(
                f,
                "Shipping dates span too widely: {} to {} is {} days (allowed {})",
                earliest,
                latest,
                (*latest - *earliest).num_days(),
                allowed_days
            ),
        }
    }
}

/// Builds a `LoadedContainer` with freshly derived totals and issues.
///
/// # Parameters
/// * `container` - The instance holding the products
/// * `products` - Fragments assigned to the instance, in load order
/// * `options` - Weight limit, date spread and utilization ceiling
pub fn finalize(
    container: ContainerInstance,
    products: Vec<Product>,
    options: &FinalizeOptions,
) -> LoadedContainer {
    let total_utilization = utilization_of(&container, &products);
    let total_weight: f64 = products.iter().map(Product::effective_weight).sum();
    let validation_issues = inspect(&container, &products, total_utilization, total_weight, options)
        .iter()
        .map(ToString::to_string)
        .collect();
    LoadedContainer {
        container,
        assigned_products: products,
        total_utilization,
        total_weight,
        validation_issues,
    }
}

/// Sum of per-fragment capacity shares in percent.
///
/// Fragments with an unsupported form factor contribute nothing; they are
/// reported as issues instead.
pub fn utilization_of(container: &ContainerInstance, products: &[Product]) -> f64 {
    products
        .iter()
        .filter_map(|product| {
            container
                .template
                .unit_share(&product.form_factor_id)
                .map(|share| share * product.quantity as f64)
        })
        .sum()
}

/// Lists every issue of a container without building it.
pub fn inspect(
    container: &ContainerInstance,
    products: &[Product],
    total_utilization: f64,
    total_weight: f64,
    options: &FinalizeOptions,
) -> Vec<ContainerIssue> {
    let mut issues: Vec<ContainerIssue> = products
        .iter()
        .flat_map(|product| {
            check_placement(product, &container.template)
                .into_iter()
                .map(|issue| ContainerIssue::Product {
                    product_id: product.id.clone(),
                    name: product.name.clone(),
                    issue,
                })
        })
        .collect();

    let threshold = overfill_threshold(options.max_utilization.unwrap_or(100.0));
    if total_utilization > threshold {
        issues.push(ContainerIssue::Overfilled {
            utilization: total_utilization,
            threshold,
        });
    }

    if let Some(limit) = options.weight_limit {
        if exceeds_weight_limit(total_weight, limit) {
            issues.push(ContainerIssue::WeightLimitExceeded {
                total: total_weight,
                limit,
            });
        }
    }

    if let Some(allowed_days) = options.shipping_date_grouping_range_days {
        let dates = products.iter().filter_map(Product::shipping_available_date);
        let earliest = dates.clone().min();
        let latest = dates.max();
        if let (Some(earliest), Some(latest)) = (earliest, latest) {
            if (latest - earliest).num_days() > allowed_days as i64 {
                issues.push(ContainerIssue::ShippingDatesSpread {
                    earliest,
                    latest,
                    allowed_days,
                });
            }
        }
    }
    issues
}
