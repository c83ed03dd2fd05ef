//! Partial mutation objects proposed by hook handlers.
//!
//! A mutation is a handler's partial update to user or JWT data. Fields are
//! `None` unless the handler explicitly set them: `None` means "no opinion",
//! never "clear this field". Mutations from successive handlers in a chain
//! merge by simple override, later non-`None` wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute map keyed by attribute pointer (e.g. `name`, `x_plan`).
///
/// `BTreeMap` keeps serialized output stable, which matters for signature
/// computation over event bodies.
pub type AttributeMap = BTreeMap<String, Value>;

/// Handler-proposed partial update, merged across a chain and applied once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mutations {
    /// Proposed changes to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserMutations>,

    /// Proposed changes to the JWT being minted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtMutations>,
}

/// Partial update to user data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMutations {
    /// Replacement standard attributes, if the handler expressed an opinion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_attributes: Option<AttributeMap>,

    /// Replacement custom attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_attributes: Option<AttributeMap>,

    /// Replacement role keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Replacement group keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

/// Partial update to the JWT payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtMutations {
    /// Replacement JWT payload claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AttributeMap>,
}

impl Mutations {
    /// Returns true when no field carries an opinion.
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.jwt.is_none()
    }

    /// Merges `overlay` on top of `self`, field by field.
    ///
    /// Later non-`None` fields win; `None` fields leave the accumulated
    /// value untouched. This is the chain accumulation rule: the merge of
    /// M1..MN equals folding `merge` left to right in configuration order.
    pub fn merge(&self, overlay: &Mutations) -> Mutations {
        Mutations {
            user: match (&self.user, &overlay.user) {
                (None, None) => None,
                (Some(base), None) => Some(base.clone()),
                (None, Some(over)) => Some(over.clone()),
                (Some(base), Some(over)) => Some(UserMutations {
                    standard_attributes: over
                        .standard_attributes
                        .clone()
                        .or_else(|| base.standard_attributes.clone()),
                    custom_attributes: over
                        .custom_attributes
                        .clone()
                        .or_else(|| base.custom_attributes.clone()),
                    roles: over.roles.clone().or_else(|| base.roles.clone()),
                    groups: over.groups.clone().or_else(|| base.groups.clone()),
                }),
            },
            jwt: match (&self.jwt, &overlay.jwt) {
                (None, None) => None,
                (Some(base), None) => Some(base.clone()),
                (None, Some(over)) => Some(over.clone()),
                (Some(base), Some(over)) => Some(JwtMutations {
                    payload: over.payload.clone().or_else(|| base.payload.clone()),
                }),
            },
        }
    }
}
