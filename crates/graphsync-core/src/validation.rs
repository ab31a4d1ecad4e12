//! Validator contract
//!
//! Rule evaluation lives outside the core. The container routes violations
//! into each entity's error list and mirrors them up the composition chain.

use crate::entity::Entity;
use crate::model::EntityHandle;

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationViolation {
    pub message: String,
    /// Members the failure applies to; empty for whole-entity failures
    pub member_names: Vec<String>,
    /// Set when the violation was mirrored from a composed descendant
    pub origin: Option<EntityHandle>,
}

impl ValidationViolation {
    pub fn new(message: impl Into<String>, member_names: &[&str]) -> Self {
        Self {
            message: message.into(),
            member_names: member_names.iter().map(|s| s.to_string()).collect(),
            origin: None,
        }
    }

    pub fn applies_to(&self, member: &str) -> bool {
        self.member_names.iter().any(|m| m == member)
    }

    /// Copy of this violation as seen from an ancestor through `path`
    pub(crate) fn mirrored(&self, path: &str, origin: EntityHandle) -> Self {
        let member_names = if self.member_names.is_empty() {
            vec![path.to_string()]
        } else {
            self.member_names
                .iter()
                .map(|m| format!("{}.{}", path, m))
                .collect()
        };
        Self {
            message: self.message.clone(),
            member_names,
            origin: Some(self.origin.unwrap_or(origin)),
        }
    }
}

/// Evaluates validation rules for an entity
///
/// `member` is `Some` when a single member was just set and `None` for
/// whole-object validation at the end of an edit session or before submit.
pub trait Validator: Send + Sync {
    fn validate(&self, entity: &Entity, member: Option<&str>) -> Vec<ValidationViolation>;
}

/// Validator that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _entity: &Entity, _member: Option<&str>) -> Vec<ValidationViolation> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContainerId;

    #[test]
    fn test_mirrored_prefixes_members() {
        let origin = EntityHandle::new(ContainerId::next(), 7);
        let v = ValidationViolation::new("must be positive", &["Quantity"]);

        let up = v.mirrored("Lines", origin);
        assert_eq!(up.member_names, vec!["Lines.Quantity".to_string()]);
        assert_eq!(up.origin, Some(origin));

        let up2 = up.mirrored("Orders", EntityHandle::new(origin.container(), 9));
        assert_eq!(up2.member_names, vec!["Orders.Lines.Quantity".to_string()]);
        assert_eq!(up2.origin, Some(origin));
    }

    #[test]
    fn test_whole_entity_violation_mirrors_to_path() {
        let origin = EntityHandle::new(ContainerId::next(), 1);
        let v = ValidationViolation::new("line invalid", &[]);
        assert_eq!(v.mirrored("Lines", origin).member_names, vec!["Lines".to_string()]);
    }
}
