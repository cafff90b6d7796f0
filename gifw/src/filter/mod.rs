//! Layer filter builder.
//!
//! A filter is a tree of `AND`/`OR`/`NOT` groups with leaf [`Condition`]s. The tree is edited by
//! the filter panel, validated with [`validate`], and serialized to CQL with
//! [`FilterGroup::to_cql`]. CQL strings of a layer are parsed back with [`cql::parse_cql`].

use serde::{Deserialize, Serialize};

use crate::error::GifwError;

mod controller;
pub mod cql;
mod suggest;
mod validate;

pub use controller::LayerFilterController;
pub use suggest::{suggest_values, SuggestionRequest, PAGED_UNIQUE_PROCESS};
pub use validate::validate;

/// Type of a filtered property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// Text.
    String,
    /// Whole number.
    Int,
    /// Real number.
    Number,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Date with time (RFC 3339 or `YYYY-MM-DDTHH:MM:SS`).
    DateTime,
}

impl PropertyType {
    /// Returns true for types whose literals are written without quotes.
    pub fn is_numeric(&self) -> bool {
        matches!(self, PropertyType::Int | PropertyType::Number)
    }
}

/// Property that can be filtered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterProperty {
    /// Property name on the server.
    pub name: String,
    /// Property type.
    pub property_type: PropertyType,
}

impl FilterProperty {
    /// Creates a new property.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
        }
    }
}

/// Comparison of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Equals,
    /// `<>`
    NotEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
    /// `BETWEEN lower AND upper`
    Between,
    /// `LIKE pattern`
    Like,
    /// `IS NULL`
    IsNull,
}

impl Operator {
    /// CQL symbol of simple comparisons.
    pub fn symbol(&self) -> Option<&'static str> {
        Some(match self {
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::Between | Operator::Like | Operator::IsNull => return None,
        })
    }

    /// Returns true if the operator takes no value.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull)
    }
}

/// Leaf of the filter tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Filtered property name.
    pub property: String,
    /// Type of the property.
    pub property_type: PropertyType,
    /// Comparison.
    pub operator: Operator,
    /// Value, or the lower bound of `BETWEEN`.
    pub value: Option<String>,
    /// Upper bound of `BETWEEN`.
    pub upper: Option<String>,
}

impl Condition {
    /// Creates a condition without values.
    pub fn new(property: &FilterProperty, operator: Operator) -> Self {
        Self {
            property: property.name.clone(),
            property_type: property.property_type,
            operator,
            value: None,
            upper: None,
        }
    }

    /// Sets the value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the upper bound of `BETWEEN`.
    pub fn with_upper(mut self, upper: impl Into<String>) -> Self {
        self.upper = Some(upper.into());
        self
    }
}

/// Logical operator of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupOperator {
    /// All children must match.
    And,
    /// Any child must match.
    Or,
    /// Children combined with `AND` must not match.
    Not,
}

/// Node of the filter tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterNode {
    /// Nested group.
    Group(FilterGroup),
    /// Leaf condition.
    Condition(Condition),
}

/// Group of filter nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    /// Logical operator.
    pub operator: GroupOperator,
    /// Children of the group.
    pub children: Vec<FilterNode>,
}

impl Default for FilterGroup {
    fn default() -> Self {
        Self::new(GroupOperator::And)
    }
}

/// Position of a node in the tree: child indices starting from the root group.
pub type NodePath = [usize];

impl FilterGroup {
    /// Creates an empty group.
    pub fn new(operator: GroupOperator) -> Self {
        Self {
            operator,
            children: vec![],
        }
    }

    /// Adds a child node.
    pub fn with_child(mut self, child: FilterNode) -> Self {
        self.children.push(child);
        self
    }

    /// Returns true if the group contains no conditions at any depth.
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(|child| match child {
            FilterNode::Group(group) => group.is_empty(),
            FilterNode::Condition(_) => false,
        })
    }

    /// Group at the path. An empty path is the group itself.
    pub fn group_at(&self, path: &NodePath) -> Option<&FilterGroup> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match self.children.get(*first)? {
            FilterNode::Group(group) => group.group_at(rest),
            FilterNode::Condition(_) => None,
        }
    }

    /// Mutable group at the path.
    pub fn group_at_mut(&mut self, path: &NodePath) -> Option<&mut FilterGroup> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match self.children.get_mut(*first)? {
            FilterNode::Group(group) => group.group_at_mut(rest),
            FilterNode::Condition(_) => None,
        }
    }

    /// Mutable condition at the path.
    pub fn condition_at_mut(&mut self, path: &NodePath) -> Option<&mut Condition> {
        let (last, parent) = path.split_last()?;
        match self.group_at_mut(parent)?.children.get_mut(*last)? {
            FilterNode::Condition(condition) => Some(condition),
            FilterNode::Group(_) => None,
        }
    }

    /// Appends a node to the group at `parent` and returns the path of the new node.
    pub fn insert(&mut self, parent: &NodePath, node: FilterNode) -> Result<Vec<usize>, GifwError> {
        let group = self
            .group_at_mut(parent)
            .ok_or_else(|| GifwError::NotFound(format!("filter group {parent:?}")))?;
        group.children.push(node);

        let mut path = parent.to_vec();
        path.push(group.children.len() - 1);
        Ok(path)
    }

    /// Removes the node at the path.
    pub fn remove(&mut self, path: &NodePath) -> Option<FilterNode> {
        let (last, parent) = path.split_last()?;
        let group = self.group_at_mut(parent)?;
        (*last < group.children.len()).then(|| group.children.remove(*last))
    }

    /// Serializes the group to CQL. Returns `None` if the group has no conditions.
    pub fn to_cql(&self) -> Option<String> {
        cql::serialize_group(self, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_editing() {
        let name = FilterProperty::new("name", PropertyType::String);
        let mut root = FilterGroup::default();

        let group_path = root
            .insert(&[], FilterNode::Group(FilterGroup::new(GroupOperator::Or)))
            .unwrap();
        assert!(root.is_empty());

        let condition_path = root
            .insert(
                &group_path,
                FilterNode::Condition(Condition::new(&name, Operator::Equals)),
            )
            .unwrap();
        assert_eq!(condition_path, vec![0, 0]);
        assert!(!root.is_empty());

        root.condition_at_mut(&condition_path).unwrap().value = Some("A".into());
        assert_eq!(root.to_cql().as_deref(), Some("name = 'A'"));

        assert!(root.insert(&[0, 0], FilterNode::Group(FilterGroup::default())).is_err());
        assert!(root.remove(&[0, 5]).is_none());
        assert!(root.remove(&condition_path).is_some());
        assert_eq!(root.to_cql(), None);
    }
}
