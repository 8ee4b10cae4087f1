//! References from expressions to other objects.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::parse::{parse_steps, Step};
use super::{InstanceKey, Resource, ResourceInstance};

/// The object a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Referenceable {
    /// `var.NAME`
    InputVariable(String),
    /// `local.NAME`
    LocalValue(String),
    /// `module.NAME`, usually followed by an output name.
    ModuleCall(String),
    /// `TYPE.NAME` or `data.TYPE.NAME`
    Resource(Resource),
    /// `TYPE.NAME[KEY]`
    ResourceInstance(ResourceInstance),
    /// `count.index`
    CountIndex,
    /// `each.key`
    EachKey,
    /// `each.value`
    EachValue,
    /// `self`, the object a postcondition checks.
    SelfObject,
}

impl Referenceable {
    /// The resource this referenceable belongs to, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(r) => Some(r),
            Self::ResourceInstance(ri) => Some(&ri.resource),
            _ => None,
        }
    }

    /// Returns true for repetition symbols that never create dependencies.
    #[must_use]
    pub const fn is_repetition(&self) -> bool {
        matches!(self, Self::CountIndex | Self::EachKey | Self::EachValue)
    }

    /// Returns true for symbols bound by the enclosing block rather than
    /// by another graph vertex.
    #[must_use]
    pub const fn is_local_symbol(&self) -> bool {
        self.is_repetition() || matches!(self, Self::SelfObject)
    }
}

impl fmt::Display for Referenceable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputVariable(name) => write!(f, "var.{name}"),
            Self::LocalValue(name) => write!(f, "local.{name}"),
            Self::ModuleCall(name) => write!(f, "module.{name}"),
            Self::Resource(r) => write!(f, "{r}"),
            Self::ResourceInstance(ri) => write!(f, "{ri}"),
            Self::CountIndex => write!(f, "count.index"),
            Self::EachKey => write!(f, "each.key"),
            Self::EachValue => write!(f, "each.value"),
            Self::SelfObject => write!(f, "self"),
        }
    }
}

/// One step of a traversal after the referenced object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TraversalStep {
    /// Attribute access.
    Attr(String),
    /// Index access.
    Index(InstanceKey),
}

/// A parsed reference such as `test_instance.a[0].id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    /// What is referenced.
    pub subject: Referenceable,
    /// Attribute and index steps applied to the subject's value.
    pub remaining: Vec<TraversalStep>,
}

impl Reference {
    /// For `module.NAME.OUTPUT`, the output name.
    #[must_use]
    pub fn module_output(&self) -> Option<&str> {
        match (&self.subject, self.remaining.first()) {
            (Referenceable::ModuleCall(_), Some(TraversalStep::Attr(name))) => Some(name),
            _ => None,
        }
    }
}

fn into_traversal(steps: &[Step]) -> Vec<TraversalStep> {
    steps
        .iter()
        .map(|step| match step {
            Step::Attr(name) => TraversalStep::Attr(name.clone()),
            Step::Index(key) => TraversalStep::Index(key.clone()),
        })
        .collect()
}

impl FromStr for Reference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = parse_steps(s)?;
        let invalid = |message: &str| ConfigError::InvalidAddress {
            input: s.to_string(),
            message: message.to_string(),
        };
        let named = |rest: &[Step]| -> Result<String, ConfigError> {
            match rest.first() {
                Some(Step::Attr(name)) => Ok(name.clone()),
                _ => Err(invalid("expected a name")),
            }
        };

        let first = steps
            .first()
            .and_then(Step::as_attr)
            .ok_or_else(|| invalid("expected a name"))?;

        let (subject, consumed) = match first {
            "var" => (Referenceable::InputVariable(named(&steps[1..])?), 2),
            "local" => (Referenceable::LocalValue(named(&steps[1..])?), 2),
            "module" => (Referenceable::ModuleCall(named(&steps[1..])?), 2),
            "self" => (Referenceable::SelfObject, 1),
            "count" => match steps.get(1) {
                Some(Step::Attr(attr)) if attr == "index" => (Referenceable::CountIndex, 2),
                _ => return Err(invalid("the only attribute of count is \"index\"")),
            },
            "each" => match steps.get(1) {
                Some(Step::Attr(attr)) if attr == "key" => (Referenceable::EachKey, 2),
                Some(Step::Attr(attr)) if attr == "value" => (Referenceable::EachValue, 2),
                _ => return Err(invalid("the attributes of each are \"key\" and \"value\"")),
            },
            _ => {
                let (resource, rest) =
                    Resource::from_steps(&steps).ok_or_else(|| invalid("expected TYPE.NAME"))?;
                let used = steps.len() - rest.len();
                match rest.first() {
                    Some(Step::Index(key)) => (
                        Referenceable::ResourceInstance(resource.instance(key.clone())),
                        used + 1,
                    ),
                    _ => (Referenceable::Resource(resource), used),
                }
            }
        };

        Ok(Self {
            subject,
            remaining: into_traversal(&steps[consumed.min(steps.len())..]),
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)?;
        for step in &self.remaining {
            match step {
                TraversalStep::Attr(name) => write!(f, ".{name}")?,
                TraversalStep::Index(key) => write!(f, "{key}")?,
            }
        }
        Ok(())
    }
}
