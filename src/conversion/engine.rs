// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Runs conversion paths against concrete values.

use crate::conversion::{ConversionRegistry, Data, DataType, Owner};
use futures::future::BoxFuture;
use std::sync::Arc;

/**
Executes conversions, copies and releases using a shared [ConversionRegistry].

This is a cheap handle; clone it wherever conversions are needed.

None of these operations fail loudly for a missing registration.  A missing path or copy
operator is logged and reported as `None`, and a missing destructor means there is nothing
to release.
*/
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    registry: Arc<ConversionRegistry>,
}

impl ConversionEngine {
    pub fn new(registry: Arc<ConversionRegistry>) -> Self {
        ConversionEngine { registry }
    }

    pub fn registry(&self) -> &Arc<ConversionRegistry> {
        &self.registry
    }

    /**
    Converts `value` of type `from` into one of the types in `to`.

    Steps run strictly in sequence.  After each step except the first, the value the step
    consumed is released with its type's destructor, and that release completes before the
    next step starts.  Neither the caller's input nor the final output is ever released here.

    Returns `None` if no path exists or if a step produces nothing; in the latter case the
    remaining steps are skipped.
    */
    pub async fn convert(&self, owner: Owner<'_>, value: Data, from: &DataType, to: &[DataType]) -> Option<Data> {
        let Some(path) = self.registry.get_conversion_path(from, to) else {
            logwise::warn_sync!(
                "Conversion {from} ---> {to} cannot be done",
                from = from.to_string(),
                to = logwise::privacy::LogIt(&to)
            );
            return None;
        };

        let mut current = value;
        for (step, edge) in path.edges().iter().enumerate() {
            let next = edge.transform().apply(owner, current.clone()).await;
            if step > 0 {
                //intermediate: we produced it, so we release it
                if let Some(release) = self.destroy(current, edge.from()) {
                    release.await;
                }
            }
            match next {
                Some(next) => current = next,
                None => {
                    let step = step as u64;
                    logwise::error_sync!(
                        "Conversion {from} ---> {to} produced no value at step {step} ({edge_from} -> {edge_to})",
                        from = from.to_string(),
                        to = logwise::privacy::LogIt(&to),
                        step = step,
                        edge_from = edge.from().to_string(),
                        edge_to = edge.to().to_string()
                    );
                    return None;
                }
            }
        }
        Some(current)
    }

    /**
    Copies `value` using the copy operator learned for `ty`.

    Returns `None` if there is no copy operator.  Types without one are expected to be
    immutable, so sharing the original is usually what the caller wants next.
    */
    pub async fn copy(&self, owner: Owner<'_>, value: Data, ty: &DataType) -> Option<Data> {
        let Some(copy) = self.registry.copy_operator(ty) else {
            logwise::warn_sync!("No copy operator for type {ty}", ty = ty.to_string());
            return None;
        };
        copy.apply(owner, value).await
    }

    /**
    Releases `value` of type `ty`.

    Returns `None` when no destructor is registered, which means nothing needs releasing.
    Otherwise the release happens when the returned future is awaited.
    */
    pub fn destroy(&self, value: Data, ty: &DataType) -> Option<BoxFuture<'static, ()>> {
        self.registry.destructor(ty).map(|d| d.release(value))
    }
}
