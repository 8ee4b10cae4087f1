//! Graph vertices of the plan, apply and validate graphs.
//!
//! Every flavor of resource vertex shares one payload type and differs only
//! in its [`InstanceFlavor`] or [`ResourceFlavor`] tag. The behaviours that
//! differ (execution, references, expansion) dispatch on that tag in the
//! walk visitor.

use std::fmt;

use crate::addrs::{
    AbsProviderConfig, AbsResourceInstance, ConfigResource, ModulePath, Reference, Referenceable,
    ResourceMode,
};
use crate::config::{Expr, ModuleCallBlock, ProviderBlock, ResourceBlock};
use crate::graph::Vertex;
use crate::value::Value;

/// Key under which a vertex can be referenced: the static module path the
/// reference is written in plus the rendered reference subject.
pub type RefKey = (ModulePath, String);

/// Where a provider instance key expression is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKeyScope {
    /// In the scope of the consuming resource instance.
    Resource,
    /// In the parent of the named child module, with the repetition data
    /// of the call that produced the child instance.
    ModuleCall(ModulePath),
}

/// A per-instance provider key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderKey {
    /// Expression yielding the instance key.
    pub expr: Expr,
    /// Where it is evaluated.
    pub scope: ProviderKeyScope,
}

/// The provider configuration a consumer resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    /// Concrete provider configuration.
    pub addr: AbsProviderConfig,
    /// Key selecting one instance of a `for_each` provider, if any.
    pub key: Option<ProviderKey>,
}

/// Behaviour of a configuration-level resource vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFlavor {
    /// Expands into plan instances during the walk.
    Plan,
    /// Records the expansion of an apply-time resource.
    Apply,
    /// Validates the configuration block once.
    Validate,
}

/// A resource or data block, before instance expansion.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Configuration address.
    pub addr: ConfigResource,
    /// Flavor.
    pub flavor: ResourceFlavor,
    /// Attached configuration.
    pub config: Option<ResourceBlock>,
    /// Resolved provider.
    pub provider: Option<ResolvedProvider>,
    /// Managed resources this resource depends on, directly or not.
    pub dependencies: Vec<ConfigResource>,
}

impl ResourceNode {
    /// A configuration-level vertex without attachments.
    #[must_use]
    pub const fn new(addr: ConfigResource, flavor: ResourceFlavor) -> Self {
        Self {
            addr,
            flavor,
            config: None,
            provider: None,
            dependencies: Vec::new(),
        }
    }
}

/// Behaviour of a resource instance vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceFlavor {
    /// Plan an instance present in configuration.
    Plan,
    /// Plan the deletion of an instance only present in state.
    PlanOrphan,
    /// Plan the deletion of an instance in destroy mode.
    PlanDestroy,
    /// Apply a create, update, read, no-op or forget change.
    Apply,
    /// Apply a delete, including the delete half of a replacement.
    ApplyDestroy,
}

/// One resource instance object.
#[derive(Debug, Clone)]
pub struct InstanceNode {
    /// Instance address.
    pub addr: AbsResourceInstance,
    /// Flavor.
    pub flavor: InstanceFlavor,
    /// Deposed object key, for vertices acting on a deposed object.
    pub deposed: Option<String>,
    /// Attached configuration, absent for orphans.
    pub config: Option<ResourceBlock>,
    /// Exact provider recorded in state, which must still exist.
    pub stored_provider: Option<AbsProviderConfig>,
    /// Resolved provider.
    pub provider: Option<ResolvedProvider>,
    /// Whether replacement creates the new object first.
    pub create_before_destroy: bool,
    /// Managed resources this instance depends on through configuration.
    pub dependencies: Vec<ConfigResource>,
    /// Dependencies recorded in the prior state object.
    pub state_dependencies: Vec<ConfigResource>,
}

impl InstanceNode {
    /// An instance vertex without attachments.
    #[must_use]
    pub const fn new(addr: AbsResourceInstance, flavor: InstanceFlavor) -> Self {
        Self {
            addr,
            flavor,
            deposed: None,
            config: None,
            stored_provider: None,
            provider: None,
            create_before_destroy: false,
            dependencies: Vec::new(),
            state_dependencies: Vec::new(),
        }
    }

    /// Sets the deposed key.
    #[must_use]
    pub fn with_deposed(mut self, key: Option<String>) -> Self {
        self.deposed = key;
        self
    }

    /// True for flavors that remove an object.
    #[must_use]
    pub const fn is_destroyer(&self) -> bool {
        matches!(
            self.flavor,
            InstanceFlavor::PlanDestroy | InstanceFlavor::ApplyDestroy | InstanceFlavor::PlanOrphan
        )
    }
}

/// A module call, expanded once per instance of its parent module.
#[derive(Debug, Clone)]
pub struct ModuleExpandNode {
    /// Static path of the called module.
    pub path: ModulePath,
    /// The call block in the parent module.
    pub call: ModuleCallBlock,
}

/// A provider configuration block or an implied default configuration.
#[derive(Debug, Clone)]
pub struct ProviderNode {
    /// Configuration address.
    pub addr: AbsProviderConfig,
    /// Block, absent for implied default configurations.
    pub config: Option<ProviderBlock>,
}

/// A provider passed into a child module.
#[derive(Debug, Clone)]
pub struct ProxyNode {
    /// Address inside the child module.
    pub addr: AbsProviderConfig,
    /// Address in the parent module the proxy stands for.
    pub target: AbsProviderConfig,
    /// Key expression supplied with the passing.
    pub key: Option<ProviderKey>,
}

/// An input variable of one static module path.
#[derive(Debug, Clone)]
pub struct VariableNode {
    /// Module that declares the variable.
    pub module: ModulePath,
    /// Variable name.
    pub name: String,
    /// Declared default.
    pub default: Option<Value>,
    /// Value expression from the calling module block.
    pub input: Option<Expr>,
}

/// A local value of one static module path.
#[derive(Debug, Clone)]
pub struct LocalNode {
    /// Module that declares the local.
    pub module: ModulePath,
    /// Local name.
    pub name: String,
    /// Value expression.
    pub expr: Expr,
}

/// An output value of one static module path.
#[derive(Debug, Clone)]
pub struct OutputNode {
    /// Module that declares the output.
    pub module: ModulePath,
    /// Output name.
    pub name: String,
    /// Value expression.
    pub expr: Expr,
}

/// A graph vertex.
#[derive(Debug, Clone)]
pub enum Node {
    /// Resource block.
    Resource(ResourceNode),
    /// Resource instance.
    Instance(InstanceNode),
    /// Module call expansion.
    ModuleExpand(ModuleExpandNode),
    /// Join point after everything in a module.
    ModuleClose(ModulePath),
    /// Join point after everything in the graph.
    RootClose,
    /// Provider configuration.
    Provider(ProviderNode),
    /// Provider passed into a module.
    ProviderProxy(ProxyNode),
    /// Provider teardown.
    CloseProvider(AbsProviderConfig),
    /// Input variable.
    Variable(VariableNode),
    /// Local value.
    Local(LocalNode),
    /// Output value.
    Output(OutputNode),
}

/// The reference key for a reference written in `module`.
///
/// Repetition symbols are not graph references and yield `None`.
#[must_use]
pub fn reference_key(module: &ModulePath, reference: &Reference) -> Option<RefKey> {
    let subject = match &reference.subject {
        Referenceable::InputVariable(_) | Referenceable::LocalValue(_) => {
            reference.subject.to_string()
        }
        Referenceable::ModuleCall(call) => match reference.module_output() {
            Some(output) => format!("module.{call}.{output}"),
            None => format!("module.{call}"),
        },
        Referenceable::Resource(r) => r.to_string(),
        Referenceable::ResourceInstance(ri) => ri.resource.to_string(),
        Referenceable::CountIndex
        | Referenceable::EachKey
        | Referenceable::EachValue
        | Referenceable::SelfObject => return None,
    };
    Some((module.clone(), subject))
}

fn expr_keys(module: &ModulePath, expr: &Expr, out: &mut Vec<RefKey>) {
    out.extend(expr.references().into_iter().filter_map(|r| reference_key(module, r)));
}

fn depends_on_keys(module: &ModulePath, depends_on: &[String], out: &mut Vec<RefKey>) {
    out.extend(
        depends_on
            .iter()
            .filter_map(|text| text.parse::<Reference>().ok())
            .filter_map(|r| reference_key(module, &r)),
    );
}

fn resource_block_keys(module: &ModulePath, block: &ResourceBlock, out: &mut Vec<RefKey>) {
    for expr in block.attributes.values() {
        expr_keys(module, expr, out);
    }
    for expr in [&block.count, &block.for_each, &block.provider_key].into_iter().flatten() {
        expr_keys(module, expr, out);
    }
    for check in block.lifecycle.precondition.iter().chain(&block.lifecycle.postcondition) {
        expr_keys(module, &check.condition, out);
        expr_keys(module, &check.error_message, out);
    }
    depends_on_keys(module, &block.depends_on, out);
}

impl Node {
    /// The static module path a vertex belongs to, if any.
    #[must_use]
    pub fn module_path(&self) -> Option<ModulePath> {
        match self {
            Self::Resource(n) => Some(n.addr.module.clone()),
            Self::Instance(n) => Some(n.addr.module.module()),
            Self::ModuleExpand(n) => n.path.parent(),
            Self::ModuleClose(path) => path.parent(),
            Self::Provider(n) => Some(n.addr.module.clone()),
            Self::ProviderProxy(n) => Some(n.addr.module.clone()),
            Self::Variable(n) => Some(n.module.clone()),
            Self::Local(n) => Some(n.module.clone()),
            Self::Output(n) => Some(n.module.clone()),
            Self::RootClose | Self::CloseProvider(_) => None,
        }
    }

    /// The configuration resource a resource vertex stands for.
    #[must_use]
    pub fn config_resource(&self) -> Option<ConfigResource> {
        match self {
            Self::Resource(n) => Some(n.addr.clone()),
            Self::Instance(n) => Some(n.addr.config_resource()),
            _ => None,
        }
    }

    /// True for managed (not data) resource vertices.
    #[must_use]
    pub fn is_managed_resource(&self) -> bool {
        self.config_resource()
            .is_some_and(|addr| addr.resource.mode == ResourceMode::Managed)
    }

    /// Keys other vertices can reference this vertex by.
    #[must_use]
    pub fn referenceable_keys(&self) -> Vec<RefKey> {
        match self {
            Self::Resource(n) => vec![(n.addr.module.clone(), n.addr.resource.to_string())],
            Self::Instance(n) if !n.is_destroyer() => {
                vec![(n.addr.module.module(), n.addr.resource.resource.to_string())]
            }
            Self::Variable(n) => vec![(n.module.clone(), format!("var.{}", n.name))],
            Self::Local(n) => vec![(n.module.clone(), format!("local.{}", n.name))],
            Self::Output(n) => match (n.module.parent(), n.module.call_name()) {
                (Some(parent), Some(call)) => vec![(parent, format!("module.{call}.{}", n.name))],
                _ => vec![(ModulePath::root(), format!("output.{}", n.name))],
            },
            Self::ModuleClose(path) => match (path.parent(), path.call_name()) {
                (Some(parent), Some(call)) => vec![(parent, format!("module.{call}"))],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Keys of everything this vertex's expressions refer to.
    #[must_use]
    pub fn references(&self) -> Vec<RefKey> {
        let mut out = Vec::new();
        match self {
            Self::Resource(n) => {
                if let Some(block) = &n.config {
                    resource_block_keys(&n.addr.module, block, &mut out);
                }
            }
            Self::Instance(n) if n.flavor == InstanceFlavor::Apply => {
                if let Some(block) = &n.config {
                    resource_block_keys(&n.addr.module.module(), block, &mut out);
                }
            }
            Self::ModuleExpand(n) => {
                if let Some(parent) = n.path.parent() {
                    for expr in [&n.call.count, &n.call.for_each].into_iter().flatten() {
                        expr_keys(&parent, expr, &mut out);
                    }
                    for passing in n.call.providers.values() {
                        if let Some(key) = passing.key() {
                            expr_keys(&parent, key, &mut out);
                        }
                    }
                    depends_on_keys(&parent, &n.call.depends_on, &mut out);
                }
            }
            Self::Provider(n) => {
                if let Some(block) = &n.config {
                    for expr in block.config.values().chain(block.for_each.iter()) {
                        expr_keys(&n.addr.module, expr, &mut out);
                    }
                }
            }
            Self::Variable(n) => {
                if let (Some(parent), Some(input)) = (n.module.parent(), &n.input) {
                    expr_keys(&parent, input, &mut out);
                }
            }
            Self::Local(n) => expr_keys(&n.module, &n.expr, &mut out),
            Self::Output(n) => expr_keys(&n.module, &n.expr, &mut out),
            _ => {}
        }
        out
    }
}

impl fmt::Display for InstanceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)?;
        if let (Some(key), true) = (&self.deposed, self.is_destroyer()) {
            write!(f, " (deposed {key})")?;
        }
        match self.flavor {
            InstanceFlavor::Plan | InstanceFlavor::Apply => Ok(()),
            InstanceFlavor::PlanOrphan => write!(f, " (orphan)"),
            InstanceFlavor::PlanDestroy | InstanceFlavor::ApplyDestroy => write!(f, " (destroy)"),
        }
    }
}

fn prefixed(module: &ModulePath, name: &str) -> String {
    if module.is_root() {
        name.to_string()
    } else {
        format!("{module}.{name}")
    }
}

impl Vertex for Node {
    fn name(&self) -> String {
        match self {
            Self::Resource(n) => match n.flavor {
                ResourceFlavor::Validate => format!("{} (validate)", n.addr),
                ResourceFlavor::Plan | ResourceFlavor::Apply => format!("{} (expand)", n.addr),
            },
            Self::Instance(n) => n.to_string(),
            Self::ModuleExpand(n) => format!("{} (expand)", n.path),
            Self::ModuleClose(path) => format!("{path} (close)"),
            Self::RootClose => "root".to_string(),
            Self::Provider(n) => n.addr.to_string(),
            Self::ProviderProxy(n) => format!("{} (proxy)", n.addr),
            Self::CloseProvider(addr) => format!("{addr} (close)"),
            Self::Variable(n) => prefixed(&n.module, &format!("var.{}", n.name)),
            Self::Local(n) => prefixed(&n.module, &format!("local.{}", n.name)),
            Self::Output(n) => prefixed(&n.module, &format!("output.{}", n.name)),
        }
    }
}
