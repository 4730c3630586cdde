// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Type conversion between data representations.

The pieces, from the bottom up:

1.  [DataType] names a representation.
2.  [ConversionGraph] is a weighted directed graph over those names.
3.  [ConversionRegistry] learns edges, copy operators and destructors, and memoizes paths.
4.  [ConversionEngine] actually runs a path against a value.
*/

pub mod builtin;
mod data_type;
mod engine;
mod graph;
mod registry;

pub use data_type::DataType;
pub use engine::ConversionEngine;
pub use graph::{ConversionEdge, ConversionGraph, ConversionPath};
pub use registry::{ConversionRegistry, COST_CLASS_SCALE, MAX_COST_MULTIPLIER, MAX_COST_POWER};

use crate::tiles::TileRef;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/**
A value flowing through the conversion system.

Values are reference counted so that a step can hand its input to a transform while still
being able to release it afterwards.  Mutable representations carry their own interior
mutability (see [builtin::DrawingSurface]).
*/
pub type Data = Arc<dyn Any + Send + Sync>;

/// The tile a conversion runs on behalf of, if any.
pub type Owner<'a> = Option<&'a TileRef>;

type TransformFn = dyn Fn(Owner<'_>, Data) -> BoxFuture<'static, Option<Data>> + Send + Sync;
type DestructorFn = dyn Fn(Data) -> BoxFuture<'static, ()> + Send + Sync;

/**
A conversion step.

Transforms return `None` when they cannot produce a value; inside a path that is treated as a
broken conversion and aborts the remaining steps.
*/
#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl Transform {
    /// Wraps a synchronous conversion.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Owner<'_>, Data) -> Option<Data> + Send + Sync + 'static,
    {
        Transform(Arc::new(
            move |owner: Option<&TileRef>, data: Data| -> BoxFuture<'static, Option<Data>> {
                futures::future::ready(f(owner, data)).boxed()
            },
        ))
    }

    /// Wraps a conversion that must await something, such as a file read.
    pub fn new_async<F>(f: F) -> Self
    where
        F: Fn(Owner<'_>, Data) -> BoxFuture<'static, Option<Data>> + Send + Sync + 'static,
    {
        Transform(Arc::new(f))
    }

    pub fn apply(&self, owner: Owner<'_>, data: Data) -> BoxFuture<'static, Option<Data>> {
        (self.0)(owner, data)
    }

    /// Whether both handles refer to the same learned function.
    pub fn same_as(&self, other: &Transform) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transform({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Releases a value that is no longer needed.
#[derive(Clone)]
pub struct Destructor(Arc<DestructorFn>);

impl Destructor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Data) + Send + Sync + 'static,
    {
        Destructor(Arc::new(move |data: Data| -> BoxFuture<'static, ()> {
            f(data);
            futures::future::ready(()).boxed()
        }))
    }

    pub fn new_async<F>(f: F) -> Self
    where
        F: Fn(Data) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Destructor(Arc::new(f))
    }

    pub fn release(&self, data: Data) -> BoxFuture<'static, ()> {
        (self.0)(data)
    }
}

impl Debug for Destructor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Destructor({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}
