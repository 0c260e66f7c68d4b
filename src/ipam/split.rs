//! Availability zone subnet splitting
//!
//! A cluster's range is always split into `MAX_AVAILABILITY_ZONES` equal
//! children, whether or not all of them are used yet, so zones added later
//! find room without moving existing subnets. Each zone takes one child and
//! splits it into a public (lower half) and a private (upper half) subnet.

use super::IpamError;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, BTreeSet};

/// Upper bound of availability zones per cluster
pub const MAX_AVAILABILITY_ZONES: usize = 4;

/// Prefix bits needed to split a range into `MAX_AVAILABILITY_ZONES` children
pub const ZONE_SPLIT_BITS: u8 = 2;

/// Public/private subnet pair of one availability zone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneAssignment {
    pub public: Ipv4Net,
    pub private: Ipv4Net,
}

/// Split `parent` into `MAX_AVAILABILITY_ZONES` children, in ascending order
pub fn zone_children(parent: Ipv4Net) -> Result<Vec<Ipv4Net>, IpamError> {
    let children = parent
        .subnets(parent.prefix_len() + ZONE_SPLIT_BITS)
        .map_err(|_| {
            IpamError::InvalidConfig(format!(
                "{} is too small to split into {} availability zones",
                parent, MAX_AVAILABILITY_ZONES
            ))
        })?;
    Ok(children.collect())
}

fn halves(child: Ipv4Net) -> Result<ZoneAssignment, IpamError> {
    let mut halves = child
        .subnets(child.prefix_len() + 1)
        .map_err(|_| IpamError::InvalidConfig(format!("{} is too small to split", child)))?;

    match (halves.next(), halves.next()) {
        (Some(public), Some(private)) => Ok(ZoneAssignment { public, private }),
        _ => Err(IpamError::ExecutionFailed(format!(
            "expected two halves of {}",
            child
        ))),
    }
}

/// Assign a subnet pair to every required availability zone
///
/// Zones found in `live` keep their subnets and reserve the child that
/// contains them, even when they are no longer required. Every other required
/// zone takes the lowest free child, in lexicographic order of zone names.
/// Both inputs are ordered collections, so the same input always yields the
/// same assignment.
pub fn split_availability_zones(
    parent: Ipv4Net,
    required: &BTreeSet<String>,
    live: &BTreeMap<String, ZoneAssignment>,
) -> Result<BTreeMap<String, ZoneAssignment>, IpamError> {
    if required.len() > MAX_AVAILABILITY_ZONES {
        return Err(IpamError::InvalidConfig(format!(
            "{} availability zones requested, at most {} are supported",
            required.len(),
            MAX_AVAILABILITY_ZONES
        )));
    }

    let mut free = zone_children(parent)?;
    let mut assigned = BTreeMap::new();

    for (name, pair) in live {
        let position = free
            .iter()
            .position(|child| child.contains(&pair.public) && child.contains(&pair.private))
            .ok_or_else(|| {
                IpamError::ExecutionFailed(format!(
                    "subnets {} and {} of availability zone {} do not share a free child of {}",
                    pair.public, pair.private, name, parent
                ))
            })?;
        free.remove(position);

        if required.contains(name) {
            assigned.insert(name.clone(), *pair);
        }
    }

    for name in required {
        if assigned.contains_key(name) {
            continue;
        }
        if free.is_empty() {
            return Err(IpamError::InvalidConfig(format!(
                "no free range left in {} for availability zone {}, at most {} zones are supported",
                parent, name, MAX_AVAILABILITY_ZONES
            )));
        }
        let child = free.remove(0);
        assigned.insert(name.clone(), halves(child)?);
    }

    Ok(assigned)
}

#[cfg(test)]
#[path = "split_test.rs"]
mod tests;
