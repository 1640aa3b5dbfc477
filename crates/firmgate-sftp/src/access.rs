//! Authorization checks for resolved keys.
//!
//! Two independent dimensions gate every operation: the account role
//! (what verbs are allowed) and the model allow-list (which slice of the
//! namespace is visible). Both must pass; any ambiguity denies.

use crate::{Error, Result, paths};
use firmgate_core::UserContext;

/// Operation classes the role dimension distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    Read,
    Write,
    Delete,
}

impl AccessOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            AccessOp::Read => "read",
            AccessOp::Write => "write",
            AccessOp::Delete => "delete",
        }
    }
}

/// Check role and model scope for `op` on a resolved key.
///
/// The namespace root passes the model check for reads so that scoped
/// accounts can still list it (the listing itself is filtered down to
/// permitted models). Everything deeper must carry a model segment on
/// the account's allow-list.
pub fn authorize(user: &UserContext, op: AccessOp, key: &str) -> Result<()> {
    let role_ok = match op {
        AccessOp::Read => user.role.can_read(),
        AccessOp::Write => user.role.can_write(),
        AccessOp::Delete => user.role.can_delete(),
    };
    if !role_ok {
        return Err(Error::PermissionDenied(format!(
            "role {} denies {} on {key}",
            user.role,
            op.as_str()
        )));
    }

    if user.permits_all_models() {
        return Ok(());
    }

    if paths::is_root(key) {
        // Root itself is only ever readable; mutations need a model.
        return if op == AccessOp::Read {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "{} at namespace root",
                op.as_str()
            )))
        };
    }

    match paths::model_segment(key) {
        Some(model) if user.allows_model(model) => Ok(()),
        Some(model) => Err(Error::PermissionDenied(format!(
            "model {model} not in allow-list for {}",
            user.username
        ))),
        None => Err(Error::PermissionDenied(format!(
            "no model segment in {key}"
        ))),
    }
}
