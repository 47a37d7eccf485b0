//! Physical outputs and the lifecycle that decides which one is primary

mod lifecycle;

pub use lifecycle::{CopyGroup, CopyModeError, LifecycleDecision, Migration, OutputLifecycleManager};

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use smithay::output::{Mode, Output as WlOutputHandle, PhysicalProperties, Subpixel};
use smithay::reexports::wayland_server::backend::GlobalId;
use smithay::reexports::wayland_server::protocol::wl_output::WlOutput;
use smithay::reexports::wayland_server::{Client, DisplayHandle, GlobalDispatch};
use smithay::utils::{Logical, Point, Rectangle, Size, Transform};

/// Unique identifier for outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct OutputId(NonZeroU32);

static OUTPUT_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

impl OutputId {
    /// Generate a new unique output ID
    pub fn next() -> Self {
        let id = OUTPUT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        // Safety: We start at 1 and only increment, so this is never zero
        OutputId(NonZeroU32::new(id).expect("Output ID counter overflow"))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output({})", self.0)
    }
}

/// Colour settings applied to an output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputColor {
    /// 0.0..=1.0
    pub brightness: f64,
    /// Kelvin, 1000..=20000
    pub color_temperature: u32,
}

impl Default for OutputColor {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            color_temperature: 6500,
        }
    }
}

/// Extension: every output shows its own desktop. Copy: all outputs mirror one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Extension,
    Copy,
}

/// One physical display
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub id: OutputId,
    pub name: String,
    pub geometry: Rectangle<i32, Logical>,
    pub enabled: bool,
    pub color: OutputColor,
}

impl Output {
    pub fn new(name: impl Into<String>, geometry: Rectangle<i32, Logical>) -> Self {
        Self {
            id: OutputId::next(),
            name: name.into(),
            geometry,
            enabled: true,
            color: OutputColor::default(),
        }
    }

    pub fn size(&self) -> Size<i32, Logical> {
        self.geometry.size
    }

    /// Centre of the output in global coordinates
    pub fn center(&self) -> Point<i32, Logical> {
        self.geometry.loc + Point::from((self.geometry.size.w / 2, self.geometry.size.h / 2))
    }
}

/// Output model behind a bound `wl_output`
pub fn output_id(output: &WlOutput) -> Option<OutputId> {
    WlOutputHandle::from_resource(output)?
        .user_data()
        .get::<OutputId>()
        .copied()
}

/// The `wl_output` globals advertised for each output
#[derive(Debug, Default)]
pub struct OutputGlobals {
    outputs: HashMap<OutputId, (WlOutputHandle, GlobalId)>,
}

impl OutputGlobals {
    /// Advertise `output` to clients
    pub fn insert<D>(&mut self, dh: &DisplayHandle, output: &Output)
    where
        D: GlobalDispatch<WlOutput, smithay::wayland::output::WlOutputData> + 'static,
    {
        let handle = WlOutputHandle::new(
            output.name.clone(),
            PhysicalProperties {
                size: (0, 0).into(),
                subpixel: Subpixel::Unknown,
                make: "Treeland".into(),
                model: output.name.clone(),
            },
        );
        handle.user_data().insert_if_missing(|| output.id);
        let mode = Mode {
            size: (output.geometry.size.w, output.geometry.size.h).into(),
            refresh: 60_000,
        };
        handle.change_current_state(
            Some(mode),
            Some(Transform::Normal),
            None,
            Some(output.geometry.loc),
        );
        handle.set_preferred(mode);
        let global = handle.create_global::<D>(dh);
        self.outputs.insert(output.id, (handle, global));
    }

    /// Withdraw the global of a removed output
    pub fn remove<D: 'static>(&mut self, dh: &DisplayHandle, id: OutputId) {
        if let Some((_, global)) = self.outputs.remove(&id) {
            dh.remove_global::<D>(global);
        }
    }

    /// Follow a geometry change
    pub fn reconfigured(&self, output: &Output) {
        if let Some((handle, _)) = self.outputs.get(&output.id) {
            let mode = Mode {
                size: (output.geometry.size.w, output.geometry.size.h).into(),
                refresh: 60_000,
            };
            handle.change_current_state(Some(mode), None, None, Some(output.geometry.loc));
        }
    }

    pub fn handle(&self, id: OutputId) -> Option<&WlOutputHandle> {
        self.outputs.get(&id).map(|(handle, _)| handle)
    }

    /// The `wl_output` objects `client` bound for an output
    pub fn client_outputs(&self, id: OutputId, client: &Client) -> Vec<WlOutput> {
        self.handle(id)
            .map(|handle| handle.client_outputs(client).into_iter().collect())
            .unwrap_or_default()
    }
}

/// Position of a surface after moving it from `source` to `target`
///
/// The offset from the source centre is kept and the result is clamped so the
/// surface stays inside the target.
pub fn migrate_position(
    geometry: Rectangle<i32, Logical>,
    source: Option<Rectangle<i32, Logical>>,
    target: Rectangle<i32, Logical>,
) -> Point<i32, Logical> {
    let mut loc = match source {
        Some(source) => {
            let source_center =
                source.loc + Point::from((source.size.w / 2, source.size.h / 2));
            let target_center =
                target.loc + Point::from((target.size.w / 2, target.size.h / 2));
            target_center + (geometry.loc - source_center)
        }
        None => geometry.loc,
    };

    let max_x = target.loc.x + target.size.w - geometry.size.w;
    let max_y = target.loc.y + target.size.h - geometry.size.h;
    loc.x = loc.x.min(max_x).max(target.loc.x);
    loc.y = loc.y.min(max_y).max(target.loc.y);
    loc
}
