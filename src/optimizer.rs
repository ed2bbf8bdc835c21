//! Optimization entry point tying the engine stages together.
//!
//! Flow of a run:
//! 1. Validate inputs at the boundary
//! 2. Rebuild booked containers from hard assignments (optional)
//! 3. Group remaining products by destination and shipping date
//! 4. Pack each group, topping up booked containers of the same destination
//!    and date window
//! 5. Downsize every unpinned instance to the cheapest template that fits
//! 6. Finalize all instances into `LoadedContainer`s

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::downsizer::downsize;
use crate::finalizer::{FinalizeOptions, finalize};
use crate::grouping::{GroupKey, group_products};
use crate::model::{
    ContainerTemplate, CountryOverrides, LoadedContainer, OptimizationSettings, Product,
    ValidationError,
};
use crate::packer::{IdSequence, InstanceLoad, PackingContext, pack_group, rank_templates};
use crate::seeding::{SeededInstance, seed_current_assignments};
use crate::types::overfill_threshold;

/// Errors that stop an optimization before or during packing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("Invalid product '{id}': {reason}")]
    InvalidProduct { id: String, reason: String },
    #[error("Invalid container template '{id}': {reason}")]
    InvalidTemplate { id: String, reason: String },
    #[error(
        "Product '{product_id}' references form factor '{form_factor_id}' that no container template supports"
    )]
    UnknownFormFactor {
        product_id: String,
        form_factor_id: String,
    },
    #[error("Duplicate container template id '{0}'")]
    DuplicateTemplate(String),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("Optimization was cancelled")]
    Cancelled,
}

impl OptimizeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            OptimizeError::InvalidProduct { .. } => "invalid_product",
            OptimizeError::InvalidTemplate { .. } => "invalid_template",
            OptimizeError::UnknownFormFactor { .. } => "unknown_form_factor",
            OptimizeError::DuplicateTemplate(_) => "duplicate_template",
            OptimizeError::InvalidSettings(_) => "invalid_settings",
            OptimizeError::Cancelled => "cancelled",
        }
    }
}

impl From<ValidationError> for OptimizeError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidProduct { id, reason } => {
                OptimizeError::InvalidProduct { id, reason }
            }
            ValidationError::InvalidTemplate { id, reason } => {
                OptimizeError::InvalidTemplate { id, reason }
            }
            ValidationError::InvalidSettings(reason) => OptimizeError::InvalidSettings(reason),
        }
    }
}

/// Result of an optimization run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct OptimizationResult {
    pub assignments: Vec<LoadedContainer>,
    pub unassigned: Vec<Product>,
}

impl OptimizationResult {
    /// Returns whether every unit was placed.
    pub fn is_complete(&self) -> bool {
        self.unassigned.is_empty()
    }

    pub fn container_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn unassigned_count(&self) -> usize {
        self.unassigned.len()
    }

    /// Summed country-aware cost of all planned containers.
    pub fn total_cost(&self, overrides: &CountryOverrides) -> f64 {
        self.assignments
            .iter()
            .map(|loaded| {
                let country = loaded
                    .assigned_products
                    .first()
                    .map(|product| product.country.as_str())
                    .unwrap_or("");
                overrides.cost_for(&loaded.container.template, country)
            })
            .sum()
    }
}

/// Plans products into containers.
///
/// # Parameters
/// * `products` - Product lines to plan
/// * `templates` - Available container templates
/// * `settings` - Packing ceiling, splitting and grouping options
/// * `overrides` - Country-specific costs and weight limits
///
/// # Examples
/// ```
/// use load_planner::model::{ContainerTemplate, CountryOverrides, OptimizationSettings, Product};
/// use load_planner::optimizer::optimize;
///
/// let products = vec![Product::new("p-1", "Solvent", "IBC1000", 120).unwrap().with_destination("DE")];
/// let templates = vec![
///     ContainerTemplate::new("t1", "Box").with_capacity("IBC1000", 100).with_cost(500.0).with_destination("DE"),
/// ];
/// let result = optimize(products, &templates, &OptimizationSettings::default(), &CountryOverrides::default()).unwrap();
/// assert_eq!(result.container_count(), 2);
/// assert!(result.is_complete());
/// ```
pub fn optimize(
    products: Vec<Product>,
    templates: &[ContainerTemplate],
    settings: &OptimizationSettings,
    overrides: &CountryOverrides,
) -> Result<OptimizationResult, OptimizeError> {
    optimize_with_cancel(products, templates, settings, overrides, &AtomicBool::new(false))
}

/// Like `optimize`, checking `cancel` between product groups.
#[instrument(skip_all, fields(products = products.len(), templates = templates.len()))]
pub fn optimize_with_cancel(
    products: Vec<Product>,
    templates: &[ContainerTemplate],
    settings: &OptimizationSettings,
    overrides: &CountryOverrides,
    cancel: &AtomicBool,
) -> Result<OptimizationResult, OptimizeError> {
    plan(products, templates, settings, overrides, &mut |_| {
        cancel.load(Ordering::Relaxed)
    })
}

/// Runs the whole pipeline; `stop` is asked before each group is packed.
fn plan(
    products: Vec<Product>,
    templates: &[ContainerTemplate],
    settings: &OptimizationSettings,
    overrides: &CountryOverrides,
    stop: &mut dyn FnMut(&GroupKey) -> bool,
) -> Result<OptimizationResult, OptimizeError> {
    settings.validate()?;
    validate_inputs(&products, templates)?;

    if templates.is_empty() {
        info!("no container templates supplied, every product stays unassigned");
        return Ok(OptimizationResult {
            assignments: Vec::new(),
            unassigned: products,
        });
    }

    let mut ids = IdSequence::reserving(products.iter().map(|product| product.id.as_str()));
    let (mut pending_seeds, to_pack) = if settings.respect_current_assignments {
        let seeding = seed_current_assignments(products, templates, &mut ids);
        (seeding.seeded, seeding.remaining)
    } else {
        (Vec::new(), products)
    };

    let groups = group_products(to_pack, settings.shipping_date_grouping_range_days);
    let mut pool: Vec<InstanceLoad> = Vec::new();
    let mut unassigned: Vec<Product> = Vec::new();

    for group in groups {
        if stop(&group.key) {
            info!(group = %group.key, "optimization cancelled");
            return Err(OptimizeError::Cancelled);
        }

        let (matching, rest): (Vec<SeededInstance>, Vec<SeededInstance>) = pending_seeds
            .into_iter()
            .partition(|seed| {
                group.covers(
                    &seed.key.destination,
                    seed.shipping_date(),
                    settings.shipping_date_grouping_range_days,
                )
            });
        pending_seeds = rest;
        let existing = matching.into_iter().map(|seed| seed.load).collect();

        let ranked = rank_templates(templates, &group.destination);
        let ctx = PackingContext {
            templates: &ranked,
            overrides,
            max_utilization: settings.max_utilization,
            allow_unit_splitting: settings.allow_unit_splitting,
        };
        let product_count = group.products.len();
        let outcome = pack_group(group.products, &ctx, existing, &mut ids);
        debug!(
            group = %group.key,
            products = product_count,
            templates = ranked.len(),
            instances = outcome.instances.len(),
            unassigned = outcome.unassigned.len(),
            "packed group"
        );
        pool.extend(outcome.instances);
        unassigned.extend(outcome.unassigned);
    }
    pool.extend(pending_seeds.into_iter().map(|seed| seed.load));

    let ceiling = overfill_threshold(settings.max_utilization);
    let substitutions = downsize(&mut pool, templates, overrides, ceiling);

    let assignments: Vec<LoadedContainer> = pool
        .into_iter()
        .map(|load| {
            let options = FinalizeOptions {
                weight_limit: overrides.weight_limit_for(load.template(), load.country()),
                shipping_date_grouping_range_days: settings.shipping_date_grouping_range_days,
                max_utilization: Some(settings.max_utilization),
            };
            finalize(load.instance, load.assigned, &options)
        })
        .collect();

    info!(
        containers = assignments.len(),
        unassigned = unassigned.len(),
        downsized = substitutions,
        "optimization finished"
    );
    Ok(OptimizationResult {
        assignments,
        unassigned,
    })
}

/// Rejects malformed input before any packing happens.
pub fn validate_inputs(
    products: &[Product],
    templates: &[ContainerTemplate],
) -> Result<(), OptimizeError> {
    let mut seen = BTreeSet::new();
    for template in templates {
        template.validate()?;
        if !seen.insert(template.id.as_str()) {
            return Err(OptimizeError::DuplicateTemplate(template.id.clone()));
        }
    }
    for product in products {
        product.validate()?;
        let supported = templates
            .iter()
            .any(|template| template.capacity_for(&product.form_factor_id).is_some());
        if !templates.is_empty() && !supported {
            return Err(OptimizeError::UnknownFormFactor {
                product_id: product.id.clone(),
                form_factor_id: product.form_factor_id.clone(),
            });
        }
    }
    Ok(())
}
