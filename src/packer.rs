//! Greedy first-fit-decreasing packing of product lines into container instances.
//!
//! The packer works group by group:
//! 1. Products requiring special capabilities go first, then proportionally
//!    large lines (highest capacity share per unit of the largest template).
//! 2. Each line first tops up already opened instances, fullest first.
//! 3. Whatever remains opens new instances from the ranked template list.
//!
//! Quantity is conserved: every unit ends up either in an instance or in the
//! unassigned list, split lines are represented by freshly identified fragments.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::debug;

use crate::compat::check_placement;
use crate::model::{ContainerInstance, ContainerTemplate, CountryOverrides, Product};
use crate::types::{UNIT_EPSILON, UTILIZATION_TOLERANCE, normalize_destination};

/// Deterministic source of synthetic identities for one optimization call.
///
/// Fragment ids never repeat a reserved (caller supplied) or previously
/// generated id.
#[derive(Clone, Debug, Default)]
pub struct IdSequence {
    instances: u64,
    fragments: u64,
    taken: BTreeSet<String>,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence that will not hand out any of the given ids.
    pub fn reserving<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: ids.into_iter().map(str::to_owned).collect(),
            ..Self::default()
        }
    }

    /// Next container instance id (`container-1`, `container-2`, ...).
    pub fn next_instance_id(&mut self) -> String {
        self.instances += 1;
        format!("container-{}", self.instances)
    }

    /// Next fragment id derived from the original line id.
    pub fn next_fragment_id(&mut self, lineage_id: &str) -> String {
        loop {
            self.fragments += 1;
            let candidate = format!("{}-split-{}", lineage_id, self.fragments);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// A container instance being filled, with its running totals.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceLoad {
    pub instance: ContainerInstance,
    pub assigned: Vec<Product>,
    /// Capacity share in percent of the current template.
    pub utilization: f64,
    pub weight: f64,
    /// Reconstructed from a hard booking; its template must not change.
    pub pinned: bool,
}

impl InstanceLoad {
    pub fn new(instance: ContainerInstance) -> Self {
        Self {
            instance,
            assigned: Vec::new(),
            utilization: 0.0,
            weight: 0.0,
            pinned: false,
        }
    }

    /// An instance holding a booked container.
    pub fn pinned(instance: ContainerInstance) -> Self {
        Self {
            pinned: true,
            ..Self::new(instance)
        }
    }

    pub fn template(&self) -> &ContainerTemplate {
        &self.instance.template
    }

    /// Country of the first loaded fragment, empty if nothing is loaded.
    pub fn country(&self) -> &str {
        self.assigned
            .first()
            .map(|product| product.country.as_str())
            .unwrap_or("")
    }

    /// Adds a fragment and updates the running totals.
    pub fn push(&mut self, product: Product) {
        self.utilization += share_of(&self.instance.template, &product);
        self.weight += product.effective_weight();
        self.assigned.push(product);
    }

    /// Swaps the template and recomputes utilization against it.
    pub fn retemplate(&mut self, template: ContainerTemplate) {
        self.instance.template = template;
        self.utilization = self
            .assigned
            .iter()
            .map(|product| share_of(&self.instance.template, product))
            .sum();
    }

    /// Units of `product` that still fit by capacity and weight.
    fn units_that_fit(
        &self,
        product: &Product,
        unit_weight: f64,
        weight_limit: Option<f64>,
        max_utilization: f64,
    ) -> u64 {
        let Some(share) = self.instance.template.unit_share(&product.form_factor_id) else {
            return 0;
        };
        let by_capacity = whole_units((max_utilization - self.utilization) / share);
        let by_weight = match weight_limit {
            Some(limit) if unit_weight > 0.0 => whole_units((limit - self.weight) / unit_weight),
            _ => u64::MAX,
        };
        by_capacity.min(by_weight)
    }
}

fn share_of(template: &ContainerTemplate, product: &Product) -> f64 {
    template
        .unit_share(&product.form_factor_id)
        .map(|share| share * product.quantity as f64)
        .unwrap_or(0.0)
}

fn whole_units(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        (value + UNIT_EPSILON).floor() as u64
    }
}

/// Read-only inputs shared by every product of a group.
#[derive(Clone, Copy, Debug)]
pub struct PackingContext<'a> {
    /// Templates usable for the group, ranked by `rank_templates`.
    pub templates: &'a [ContainerTemplate],
    pub overrides: &'a CountryOverrides,
    pub max_utilization: f64,
    pub allow_unit_splitting: bool,
}

/// Result of packing one group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackOutcome {
    pub instances: Vec<InstanceLoad>,
    pub unassigned: Vec<Product>,
}

/// Selects templates serving a destination, largest capacity first, then cheapest.
pub fn rank_templates(templates: &[ContainerTemplate], destination: &str) -> Vec<ContainerTemplate> {
    let destination = normalize_destination(destination);
    let mut ranked: Vec<ContainerTemplate> = templates
        .iter()
        .filter(|template| {
            let served = template.normalized_destination();
            served.is_empty() || served == destination
        })
        .cloned()
        .collect();
    ranked.sort_by(|a, b| {
        b.capacity_score()
            .cmp(&a.capacity_score())
            .then_with(|| a.cost.partial_cmp(&b.cost).unwrap_or(Ordering::Equal))
    });
    ranked
}

/// Orders products for first-fit-decreasing placement.
///
/// Restricted lines come first, then lines consuming the largest share of the
/// biggest template supporting their form factor. Ties keep input order.
pub fn order_products(products: &mut [Product], templates: &[ContainerTemplate]) {
    let largest_share = |product: &Product| {
        templates
            .iter()
            .find_map(|template| template.unit_share(&product.form_factor_id))
            .unwrap_or(0.0)
    };
    products.sort_by(|a, b| {
        let a_restricted = !a.normalized_restrictions().is_empty();
        let b_restricted = !b.normalized_restrictions().is_empty();
        b_restricted.cmp(&a_restricted).then_with(|| {
            largest_share(b)
                .partial_cmp(&largest_share(a))
                .unwrap_or(Ordering::Equal)
        })
    });
}

/// Packs one group of products.
///
/// # Parameters
/// * `products` - Lines of the group
/// * `ctx` - Ranked templates, overrides and packing limits
/// * `existing` - Instances that may be topped up before opening new ones
/// * `ids` - Identity source for new instances and fragments
///
/// # Returns
/// The existing instances (possibly topped up) followed by newly opened ones,
/// plus every quantity that could not be placed.
pub fn pack_group(
    mut products: Vec<Product>,
    ctx: &PackingContext<'_>,
    existing: Vec<InstanceLoad>,
    ids: &mut IdSequence,
) -> PackOutcome {
    order_products(&mut products, ctx.templates);

    let mut outcome = PackOutcome {
        instances: existing,
        unassigned: Vec::new(),
    };
    for product in &products {
        place_product(product, ctx, &mut outcome, ids);
    }
    outcome
}

fn place_product(
    product: &Product,
    ctx: &PackingContext<'_>,
    outcome: &mut PackOutcome,
    ids: &mut IdSequence,
) {
    let unit_weight = product.unit_weight();
    let mut remaining = product.quantity;

    // Top up open instances, fullest first.
    let mut candidates: Vec<usize> = outcome
        .instances
        .iter()
        .enumerate()
        .filter(|(_, load)| {
            load.utilization < ctx.max_utilization + UTILIZATION_TOLERANCE
                && check_placement(product, load.template()).is_empty()
        })
        .map(|(idx, _)| idx)
        .collect();
    candidates.sort_by(|&a, &b| {
        outcome.instances[b]
            .utilization
            .partial_cmp(&outcome.instances[a].utilization)
            .unwrap_or(Ordering::Equal)
    });

    for idx in candidates {
        if remaining == 0 {
            break;
        }
        let load = &outcome.instances[idx];
        let limit = ctx
            .overrides
            .weight_limit_for(load.template(), &product.country);
        let fits = load.units_that_fit(product, unit_weight, limit, ctx.max_utilization);
        let take = if ctx.allow_unit_splitting {
            fits.min(remaining)
        } else if fits >= remaining {
            remaining
        } else {
            0
        };
        if take == 0 {
            continue;
        }
        let part = portion(product, take, ids);
        outcome.instances[idx].push(part);
        remaining -= take;
    }

    // Open new instances for the rest.
    while remaining > 0 {
        let Some((template, max_units)) = select_template(product, unit_weight, remaining, ctx)
        else {
            debug!(
                product = %product.id,
                quantity = remaining,
                "no template can take the remaining quantity"
            );
            outcome.unassigned.push(portion(product, remaining, ids));
            return;
        };
        let take = if ctx.allow_unit_splitting {
            max_units.min(remaining)
        } else {
            remaining
        };
        let mut load = InstanceLoad::new(template.instantiate(ids.next_instance_id()));
        debug!(
            instance = %load.instance.id,
            template = %template.id,
            product = %product.id,
            units = take,
            "opened container instance"
        );
        load.push(portion(product, take, ids));
        outcome.instances.push(load);
        remaining -= take;
    }
}

/// First ranked template that can take at least one unit (or, without
/// splitting, the whole remaining quantity) of the product.
fn select_template<'a>(
    product: &Product,
    unit_weight: f64,
    remaining: u64,
    ctx: &PackingContext<'a>,
) -> Option<(&'a ContainerTemplate, u64)> {
    ctx.templates.iter().find_map(|template| {
        let by_capacity = template.units_within(&product.form_factor_id, ctx.max_utilization);
        if by_capacity == 0 || !check_placement(product, template).is_empty() {
            return None;
        }
        let limit = ctx.overrides.weight_limit_for(template, &product.country);
        let by_weight = match limit {
            Some(limit) if unit_weight > 0.0 => whole_units(limit / unit_weight),
            _ => u64::MAX,
        };
        let max_units = by_capacity.min(by_weight);
        if max_units == 0 || (!ctx.allow_unit_splitting && max_units < remaining) {
            return None;
        }
        Some((template, max_units))
    })
}

/// The line itself when taken whole, otherwise a freshly identified fragment.
fn portion(product: &Product, quantity: u64, ids: &mut IdSequence) -> Product {
    if quantity == product.quantity {
        product.clone()
    } else {
        product.fragment(ids.next_fragment_id(product.lineage_id()), quantity)
    }
}
