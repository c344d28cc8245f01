// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator registry.
//!
//! Operators are looked up by type name once, when a model is loaded; the
//! model caches the registry index per operator type, so dispatch never
//! compares strings.

use crate::{ops, OpContext, RuntimeError, TensorTable};
use model_ir::OpRecord;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Kernel-private state produced by [`Operator::init`].
pub type OpState = Option<Box<dyn Any + Send>>;

/// Broad operator family, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum OpGroup {
    Quantization,
    Elementwise,
    Linear,
    Layout,
    Custom,
}

impl fmt::Display for OpGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Quantization => "quantization",
            Self::Elementwise => "elementwise",
            Self::Linear => "linear",
            Self::Layout => "layout",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// A kernel the dispatch engine can run.
///
/// `init` runs once per executor, in stream order, and may validate the
/// record or precompute state. `forward` runs once per operator per pass.
/// `fini` receives the state back when the executor is released.
pub trait Operator: Send + Sync {
    /// Type name as it appears in the resource.
    fn name(&self) -> &'static str;

    fn group(&self) -> OpGroup;

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        let _ = (record, tensors);
        Ok(None)
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError>;

    fn fini(&self, state: OpState) {
        drop(state);
    }
}

/// Name-to-kernel table.
pub struct OperatorRegistry {
    ops: Vec<Box<dyn Operator>>,
    by_name: HashMap<&'static str, u32>,
}

impl OperatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in host kernels.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for op in ops::builtin() {
            registry
                .register(op)
                .expect("duplicate built-in operator");
        }
        registry
    }

    /// Adds an operator and returns its index.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidParameter`] if the name is already taken.
    pub fn register(&mut self, op: Box<dyn Operator>) -> Result<u32, RuntimeError> {
        let name = op.name();
        if self.by_name.contains_key(name) {
            return Err(RuntimeError::InvalidParameter(format!(
                "operator '{name}' registered twice"
            )));
        }
        let index = self.ops.len() as u32;
        debug!(name, index, group = %op.group(), "operator registered");
        self.by_name.insert(name, index);
        self.ops.push(op);
        Ok(index)
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Operator at a cached index.
    ///
    /// # Panics
    /// Panics if `index` did not come from this registry.
    pub fn get(&self, index: u32) -> &dyn Operator {
        self.ops[index as usize].as_ref()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.iter().map(|op| op.name())
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ── Process-wide registry ─────────────────────────────────────────

static GLOBAL: OnceLock<Arc<OperatorRegistry>> = OnceLock::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Builds the built-in registry on first call and marks the runtime
/// initialized. Idempotent.
pub fn initialize() -> Arc<OperatorRegistry> {
    let registry = GLOBAL.get_or_init(|| Arc::new(OperatorRegistry::builtin()));
    if !INITIALIZED.swap(true, Ordering::AcqRel) {
        info!(operators = registry.len(), version = version(), "runtime initialized");
    }
    Arc::clone(registry)
}

/// Marks the runtime uninitialized. Idempotent. Runtimes created
/// earlier keep their registry.
pub fn uninitialize() {
    if INITIALIZED.swap(false, Ordering::AcqRel) {
        info!("runtime uninitialized");
    }
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// The global registry, if the runtime is initialized.
pub fn global_registry() -> Option<Arc<OperatorRegistry>> {
    if !is_initialized() {
        return None;
    }
    GLOBAL.get().cloned()
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Operator for Nop {
        fn name(&self) -> &'static str {
            "Nop"
        }

        fn group(&self) -> OpGroup {
            OpGroup::Custom
        }

        fn forward(&self, _ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_names() {
        let r = OperatorRegistry::builtin();
        let names: Vec<_> = r.names().collect();
        for expected in ["Quantize", "Dequantize", "Add", "Relu", "FullyConnected", "Reshape"] {
            assert!(names.contains(&expected), "{expected} missing");
        }
        assert_eq!(r.len(), names.len());
    }

    #[test]
    fn test_builtin_registers_every_kernel() {
        let kernels = ops::builtin();
        let r = OperatorRegistry::builtin();
        assert_eq!(r.len(), kernels.len());
        for (i, op) in kernels.iter().enumerate() {
            assert_eq!(r.lookup(op.name()), Some(i as u32));
        }
    }

    #[test]
    fn test_lookup_is_cached_index() {
        let mut r = OperatorRegistry::builtin();
        let idx = r.register(Box::new(Nop)).unwrap();
        assert_eq!(r.lookup("Nop"), Some(idx));
        assert_eq!(r.get(idx).name(), "Nop");
        assert_eq!(r.lookup("Softmax"), None);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut r = OperatorRegistry::new();
        r.register(Box::new(Nop)).unwrap();
        assert!(r.register(Box::new(Nop)).is_err());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let a = initialize();
        let b = initialize();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(is_initialized());
        assert!(!version().is_empty());
    }
}
