use std::collections::HashMap;

/// Per-member flags consulted by change tracking and merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFlags {
    /// Server values may be merged into this member
    pub mergeable: bool,
    /// The member's original value is sent with updates
    pub roundtrip: bool,
    /// Callers cannot write the member; merges still can
    pub read_only: bool,
}

impl Default for MemberFlags {
    fn default() -> Self {
        Self {
            mergeable: true,
            roundtrip: false,
            read_only: false,
        }
    }
}

impl MemberFlags {
    pub fn with_roundtrip(mut self) -> Self {
        self.roundtrip = true;
        self
    }

    pub fn with_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn not_mergeable(mut self) -> Self {
        self.mergeable = false;
        self
    }
}

/// Declaration of an association member
///
/// Membership is the predicate `other.other_key == this.this_key`, compared
/// position by position. `is_foreign_key` marks the side that stores the
/// foreign key: for a to-one reference from an order to its customer,
/// `Order.CustomerId` lives on this side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    pub name: String,
    pub target_type: String,
    pub this_key: Vec<String>,
    pub other_key: Vec<String>,
    pub is_foreign_key: bool,
    pub to_many: bool,
    pub composition: bool,
    pub external_reference: bool,
    /// Member on the target type that describes the same edge from the other end
    pub reverse: Option<String>,
}

impl AssociationDescriptor {
    fn new(name: &str, target_type: &str, to_many: bool) -> Self {
        Self {
            name: name.to_string(),
            target_type: target_type.to_string(),
            this_key: Vec::new(),
            other_key: Vec::new(),
            is_foreign_key: false,
            to_many,
            composition: false,
            external_reference: false,
            reverse: None,
        }
    }

    pub fn to_many(name: &str, target_type: &str) -> Self {
        Self::new(name, target_type, true)
    }

    pub fn to_one(name: &str, target_type: &str) -> Self {
        Self::new(name, target_type, false)
    }

    pub fn keys(mut self, this_key: &[&str], other_key: &[&str]) -> Self {
        self.this_key = this_key.iter().map(|s| s.to_string()).collect();
        self.other_key = other_key.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self) -> Self {
        self.is_foreign_key = true;
        self
    }

    pub fn composition(mut self) -> Self {
        self.composition = true;
        self
    }

    pub fn external(mut self) -> Self {
        self.external_reference = true;
        self
    }

    pub fn reverse(mut self, member: &str) -> Self {
        self.reverse = Some(member.to_string());
        self
    }

    /// Members written when linking: this side's for a foreign key, else the target's
    pub fn linking_members(&self) -> &[String] {
        if self.is_foreign_key {
            &self.this_key
        } else {
            &self.other_key
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Key,
    Data,
    Association(AssociationDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
    pub flags: MemberFlags,
}

impl MemberDescriptor {
    /// Key and data members hold values; associations do not
    pub fn holds_value(&self) -> bool {
        !matches!(self.kind, MemberKind::Association(_))
    }

    pub fn association(&self) -> Option<&AssociationDescriptor> {
        match &self.kind {
            MemberKind::Association(a) => Some(a),
            _ => None,
        }
    }
}

/// Resolved metadata for one entity type
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    members: Vec<MemberDescriptor>,
    index: HashMap<String, usize>,
    key_members: Vec<String>,
}

impl EntityType {
    pub(crate) fn new(name: String, members: Vec<MemberDescriptor>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        let key_members = members
            .iter()
            .filter(|m| m.kind == MemberKind::Key)
            .map(|m| m.name.clone())
            .collect();
        Self {
            name,
            members,
            index,
            key_members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.index.get(name).map(|&i| &self.members[i])
    }

    pub fn key_members(&self) -> &[String] {
        &self.key_members
    }

    pub fn is_key(&self, member: &str) -> bool {
        self.key_members.iter().any(|k| k == member)
    }

    /// Members that hold values, in declaration order
    pub fn value_members(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| m.holds_value())
    }

    pub fn associations(&self) -> impl Iterator<Item = &AssociationDescriptor> {
        self.members.iter().filter_map(MemberDescriptor::association)
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.member(name).and_then(MemberDescriptor::association)
    }

    pub fn compositions(&self) -> impl Iterator<Item = &AssociationDescriptor> {
        self.associations().filter(|a| a.composition)
    }
}
