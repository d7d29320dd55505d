//! Per-product finalizer tokens

use std::future::Future;

use crate::crd::{Installation, Phase};
use crate::{Error, PRODUCT_FINALIZER_PREFIX};

/// Finalizer token owned by the named product
pub fn product_finalizer(product: &str) -> String {
    format!("{PRODUCT_FINALIZER_PREFIX}{product}")
}

/// Product named by a finalizer token, `None` for tokens products don't own
pub fn product_from_finalizer(token: &str) -> Option<&str> {
    token
        .strip_prefix(PRODUCT_FINALIZER_PREFIX)
        .filter(|name| !name.is_empty())
}

/// Keep a product's finalizer token in step with the Installation lifecycle
///
/// While the Installation is live the token is added and `Completed` is
/// returned. Once deletion is requested, `teardown` runs for as long as the
/// token is present; the token is dropped only when teardown reports
/// `Completed`. Teardown errors leave the token in place.
pub async fn reconcile_finalizer<F, Fut>(
    installation: &mut Installation,
    product: &str,
    teardown: F,
) -> Result<Phase, Error>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Phase, Error>>,
{
    let token = product_finalizer(product);

    if !installation.is_deleting() {
        installation.add_finalizer(&token);
        return Ok(Phase::Completed);
    }

    if !installation.has_finalizer(&token) {
        return Ok(Phase::Completed);
    }

    let phase = teardown().await?;
    if phase.is_completed() {
        installation.remove_finalizer(&token);
    }
    Ok(phase)
}
