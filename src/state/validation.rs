//! State validation for ensuring consistency across the server
//!
//! This module checks that:
//! - Workspaces only contain surfaces the registry knows
//! - Surfaces claim the workspace that lists them
//! - No surface is listed by more than one workspace
//! - The primary output exists and is enabled

use std::collections::HashMap;

use crate::{
    output::{OutputId, OutputLifecycleManager},
    surface::{ContainerKind, SurfaceId, SurfaceRegistry},
    workspace::{WorkspaceId, WorkspaceManager},
};

/// Errors that can occur during state validation
#[derive(Debug)]
pub enum ValidationError {
    /// Surface is listed by a workspace but not in the registry
    SurfaceInWorkspaceButNotInRegistry {
        workspace: WorkspaceId,
        surface: SurfaceId,
    },
    /// Surface claims a different workspace than the one listing it
    SurfaceClaimsOtherWorkspace {
        surface: SurfaceId,
        listed_in: WorkspaceId,
        claimed: i32,
    },
    /// Workspace container surface is listed by no workspace
    SurfaceInRegistryButNotInWorkspace { surface: SurfaceId },
    /// Multiple workspaces claim the same surface
    SurfaceInMultipleWorkspaces {
        surface: SurfaceId,
        workspaces: Vec<WorkspaceId>,
    },
    /// The primary output is unknown or disabled
    InvalidPrimaryOutput { output: OutputId },
}

/// Result type for validation operations
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate workspace-surface bidirectional consistency
pub fn validate_workspace_surface_consistency(
    workspaces: &WorkspaceManager,
    surfaces: &SurfaceRegistry,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut locations: HashMap<SurfaceId, Vec<WorkspaceId>> = HashMap::new();

    for workspace in workspaces.workspaces() {
        for &surface in &workspace.surfaces {
            locations.entry(surface).or_default().push(workspace.id);

            match surfaces.get(surface) {
                Some(wrapper) => {
                    if wrapper.workspace_id() != workspace.id.as_surface_workspace() {
                        errors.push(ValidationError::SurfaceClaimsOtherWorkspace {
                            surface,
                            listed_in: workspace.id,
                            claimed: wrapper.workspace_id(),
                        });
                    }
                }
                None => errors.push(ValidationError::SurfaceInWorkspaceButNotInRegistry {
                    workspace: workspace.id,
                    surface,
                }),
            }
        }
    }

    for wrapper in surfaces.iter() {
        let on_workspace = wrapper.container() == Some(ContainerKind::Workspace)
            && !wrapper.show_on_all_workspaces();
        if on_workspace && !locations.contains_key(&wrapper.id()) {
            errors.push(ValidationError::SurfaceInRegistryButNotInWorkspace {
                surface: wrapper.id(),
            });
        }
    }

    for (surface, workspaces) in locations {
        if workspaces.len() > 1 {
            errors.push(ValidationError::SurfaceInMultipleWorkspaces { surface, workspaces });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate that the primary output is usable
pub fn validate_output_consistency(outputs: &OutputLifecycleManager) -> ValidationResult {
    match outputs.primary() {
        Some(primary) if !outputs.output(primary).is_some_and(|o| o.enabled) => {
            Err(vec![ValidationError::InvalidPrimaryOutput { output: primary }])
        }
        _ => Ok(()),
    }
}

/// Full state validation combining all consistency checks
pub fn validate_full_state(server: &crate::state::Server) -> ValidationResult {
    let mut all_errors = Vec::new();

    if let Err(errors) = validate_workspace_surface_consistency(&server.workspaces, &server.surfaces) {
        all_errors.extend(errors);
    }
    if let Err(errors) = validate_output_consistency(&server.outputs) {
        all_errors.extend(errors);
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors)
    }
}

#[cfg(debug_assertions)]
/// Debug helper to log validation errors
pub fn log_validation_errors(errors: &[ValidationError]) {
    for error in errors {
        tracing::error!("State validation error: {:?}", error);
    }
}
