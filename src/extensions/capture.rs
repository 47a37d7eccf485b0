//! `treeland_capture_manager_v1`: interactive screen capture
//!
//! A context asks the shell to let the user pick an output, a window or a
//! region. Only one context may be selecting at a time. Once the source is
//! ready the context can hand out a single frame and any number of
//! sessions; both are cancelled or failed when the source goes away.
//!
//! Copying pixels is left to the renderer. A frame only checks that the
//! client's buffer matches what was advertised.

use bitflags::bitflags;
use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    protocol::{wl_buffer::WlBuffer, wl_shm, wl_surface::WlSurface},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use smithay::utils::{Logical, Rectangle};
use smithay::wayland::shm::with_buffer_contents;
use tracing::{debug, info, warn};

use crate::output::OutputId;
use crate::protocols::capture::{
    treeland_capture_context_v1::{self, TreelandCaptureContextV1},
    treeland_capture_frame_v1::{self, TreelandCaptureFrameV1},
    treeland_capture_manager_v1::{self, TreelandCaptureManagerV1},
    treeland_capture_session_v1::{self, TreelandCaptureSessionV1},
};
use crate::protocols::ResourceTable;
use crate::surface::{surface_id, SurfaceId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SourceType: u32 {
        const OUTPUT = 0x1;
        const WINDOW = 0x2;
        const REGION = 0x4;
    }
}

/// Why a selection produced no source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SourceFailure {
    SelectorBusy = 1,
    UserCancel = 2,
    SourceDestroyed = 3,
    Other = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CancelReason {
    Temporary = 0,
    Permanent = 1,
    Resizing = 2,
}

/// What a selected source follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    Output(OutputId),
    Window(SurfaceId),
    /// A fixed area on an output
    Region(OutputId),
}

impl CaptureTarget {
    pub fn source_type(&self) -> SourceType {
        match self {
            CaptureTarget::Output(_) => SourceType::OUTPUT,
            CaptureTarget::Window(_) => SourceType::WINDOW,
            CaptureTarget::Region(_) => SourceType::REGION,
        }
    }

    fn depends_on_output(&self, output: OutputId) -> bool {
        matches!(self, CaptureTarget::Output(o) | CaptureTarget::Region(o) if *o == output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSource {
    pub target: CaptureTarget,
    pub region: Rectangle<i32, Logical>,
}

/// The selection options a context asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub hint: SourceType,
    pub freeze: bool,
    pub with_cursor: bool,
    pub mask: Option<SurfaceId>,
}

#[derive(Debug, Default)]
struct ContextData {
    request: Option<SelectionRequest>,
    source: Option<CaptureSource>,
    frame_taken: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Negotiated,
    Ready,
    Failed,
}

#[derive(Debug)]
struct FrameData {
    context: ObjectId,
    region: Rectangle<i32, Logical>,
    state: FrameState,
}

#[derive(Debug)]
struct SessionData {
    context: ObjectId,
    started: bool,
    frames_done: u32,
}

#[derive(Debug)]
pub struct CaptureState {
    global: GlobalId,
    managers: ResourceTable<TreelandCaptureManagerV1>,
    contexts: ResourceTable<TreelandCaptureContextV1, ContextData>,
    frames: ResourceTable<TreelandCaptureFrameV1, FrameData>,
    sessions: ResourceTable<TreelandCaptureSessionV1, SessionData>,
    /// The context whose selection is on screen
    selecting: Option<ObjectId>,
}

pub trait CaptureHandler {
    fn capture_state(&mut self) -> &mut CaptureState;

    /// Show the selector for a context
    fn selection_started(&mut self, request: &SelectionRequest);

    /// The selector went away, with or without a source
    fn selection_stopped(&mut self, request: &SelectionRequest);
}

impl CaptureState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandCaptureManagerV1, ()>
            + Dispatch<TreelandCaptureManagerV1, ()>
            + Dispatch<TreelandCaptureContextV1, ()>
            + Dispatch<TreelandCaptureFrameV1, ()>
            + Dispatch<TreelandCaptureSessionV1, ()>
            + CaptureHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandCaptureManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
            contexts: ResourceTable::new(),
            frames: ResourceTable::new(),
            sessions: ResourceTable::new(),
            selecting: None,
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting.is_some()
    }

    /// Options of the selection on screen
    pub fn selection(&self) -> Option<&SelectionRequest> {
        self.selecting
            .as_ref()
            .and_then(|id| self.contexts.get_id(id))
            .and_then(|data| data.request.as_ref())
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.iter().filter(|(_, data)| data.started).count()
    }

    /// The user picked a source; returns the finished selection
    pub fn finish_selection(&mut self, source: CaptureSource) -> Option<SelectionRequest> {
        let id = self.selecting.take()?;
        let (context, data) = self.contexts.entry_mut(&id).map(|(c, d)| (c.clone(), d))?;
        let request = data.request.clone()?;
        if !request.hint.contains(source.target.source_type()) {
            warn!(?source, hint = ?request.hint, "Selected source outside the hint");
            context.source_failed(SourceFailure::Other as u32);
            return Some(request);
        }
        data.source = Some(source);
        context.source_ready(
            source.region.loc.x,
            source.region.loc.y,
            source.region.size.w.max(0) as u32,
            source.region.size.h.max(0) as u32,
            source.target.source_type().bits(),
        );
        info!(?source, "Capture source ready");
        Some(request)
    }

    /// The user dismissed the selector
    pub fn cancel_selection(&mut self) -> Option<SelectionRequest> {
        let id = self.selecting.take()?;
        let (context, data) = self.contexts.entry(&id).map(|(c, d)| (c.clone(), d))?;
        context.source_failed(SourceFailure::UserCancel as u32);
        data.request.clone()
    }

    /// An output went away
    pub fn output_removed(&mut self, output: OutputId) {
        self.sources_destroyed(|target| target.depends_on_output(output));
    }

    /// A window went away
    pub fn window_removed(&mut self, surface: SurfaceId) {
        self.sources_destroyed(|target| *target == CaptureTarget::Window(surface));
    }

    fn sources_destroyed(&mut self, mut lost: impl FnMut(&CaptureTarget) -> bool) {
        let mut cancelled = Vec::new();
        for (context, data) in self.contexts.iter_mut() {
            if !data.source.is_some_and(|source| lost(&source.target)) {
                continue;
            }
            data.source = None;
            context.source_failed(SourceFailure::SourceDestroyed as u32);
            cancelled.push(context.id());
        }
        for (session, data) in self.sessions.iter_mut() {
            if cancelled.contains(&data.context) {
                data.started = false;
                session.cancel(CancelReason::Permanent as u32);
            }
        }
        for (frame, data) in self.frames.iter_mut() {
            if cancelled.contains(&data.context) && data.state == FrameState::Negotiated {
                data.state = FrameState::Failed;
                frame.failed();
            }
        }
    }

    fn copy(&mut self, frame: &TreelandCaptureFrameV1, buffer: &WlBuffer) {
        let Some(data) = self.frames.get_mut(frame) else {
            return;
        };
        let source_alive = self
            .contexts
            .get_id(&data.context)
            .is_some_and(|context| context.source.is_some());
        let region = data.region;
        let fits = with_buffer_contents(buffer, |_, _, buffer| {
            buffer.width == region.size.w
                && buffer.height == region.size.h
                && buffer.stride >= region.size.w * 4
                && matches!(buffer.format, wl_shm::Format::Argb8888 | wl_shm::Format::Xrgb8888)
        })
        .unwrap_or(false);

        if data.state == FrameState::Negotiated && source_alive && fits {
            data.state = FrameState::Ready;
            frame.ready();
        } else {
            debug!(state = ?data.state, source_alive, fits, "Capture copy failed");
            data.state = FrameState::Failed;
            frame.failed();
        }
    }
}

impl<D> GlobalDispatch<TreelandCaptureManagerV1, (), D> for CaptureState
where
    D: GlobalDispatch<TreelandCaptureManagerV1, ()>
        + Dispatch<TreelandCaptureManagerV1, ()>
        + Dispatch<TreelandCaptureContextV1, ()>
        + CaptureHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandCaptureManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        state.capture_state().managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandCaptureManagerV1, (), D> for CaptureState
where
    D: Dispatch<TreelandCaptureManagerV1, ()>
        + Dispatch<TreelandCaptureContextV1, ()>
        + CaptureHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandCaptureManagerV1,
        request: treeland_capture_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_capture_manager_v1::Request::GetContext { context } => {
                let context = data_init.init(context, ());
                state
                    .capture_state()
                    .contexts
                    .insert(context, ContextData::default());
            }
            treeland_capture_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandCaptureManagerV1, _data: &()) {
        state.capture_state().managers.remove(resource);
    }
}

fn select_source<D: CaptureHandler>(
    state: &mut D,
    context: &TreelandCaptureContextV1,
    hint: u32,
    freeze: bool,
    with_cursor: bool,
    mask: Option<WlSurface>,
) {
    let capture = state.capture_state();
    if capture.selecting.as_ref().is_some_and(|id| *id != context.id()) {
        debug!("Capture selector busy");
        context.source_failed(SourceFailure::SelectorBusy as u32);
        return;
    }
    let hint = match SourceType::from_bits_truncate(hint) {
        hint if hint.is_empty() => SourceType::all(),
        hint => hint,
    };
    let request = SelectionRequest {
        hint,
        freeze,
        with_cursor,
        mask: mask.as_ref().map(surface_id),
    };
    let Some(data) = capture.contexts.get_mut(context) else {
        return;
    };
    data.source = None;
    data.request = Some(request.clone());
    capture.selecting = Some(context.id());
    state.selection_started(&request);
}

impl<D> Dispatch<TreelandCaptureContextV1, (), D> for CaptureState
where
    D: Dispatch<TreelandCaptureContextV1, ()>
        + Dispatch<TreelandCaptureFrameV1, ()>
        + Dispatch<TreelandCaptureSessionV1, ()>
        + CaptureHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandCaptureContextV1,
        request: treeland_capture_context_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_capture_context_v1::Request::SelectSource {
                source_hint,
                freeze,
                with_cursor,
                mask,
            } => select_source(state, resource, source_hint, freeze != 0, with_cursor != 0, mask),
            treeland_capture_context_v1::Request::Capture { frame } => {
                let frame = data_init.init(frame, ());
                let capture = state.capture_state();
                let Some(data) = capture.contexts.get_mut(resource) else {
                    return;
                };
                if data.frame_taken {
                    resource.post_error(0u32, "Cannot capture frame twice");
                    return;
                }
                let Some(source) = data.source else {
                    resource.post_error(0u32, "Source is not ready");
                    return;
                };
                data.frame_taken = true;
                let (width, height) = (
                    source.region.size.w.max(0) as u32,
                    source.region.size.h.max(0) as u32,
                );
                frame.buffer(wl_shm::Format::Argb8888 as u32, width, height, width * 4);
                frame.buffer_done();
                capture.frames.insert(
                    frame,
                    FrameData {
                        context: resource.id(),
                        region: source.region,
                        state: FrameState::Negotiated,
                    },
                );
            }
            treeland_capture_context_v1::Request::CreateSession { session } => {
                let session = data_init.init(session, ());
                let capture = state.capture_state();
                let ready = capture
                    .contexts
                    .get(resource)
                    .is_some_and(|data| data.source.is_some());
                if !ready {
                    resource.post_error(0u32, "Source is not ready");
                    return;
                }
                capture.sessions.insert(
                    session,
                    SessionData {
                        context: resource.id(),
                        started: false,
                        frames_done: 0,
                    },
                );
            }
            treeland_capture_context_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandCaptureContextV1, _data: &()) {
        let capture = state.capture_state();
        let data = capture.contexts.remove(resource);
        if capture.selecting.as_ref() != Some(&resource.id()) {
            return;
        }
        capture.selecting = None;
        if let Some(request) = data.and_then(|data| data.request) {
            state.selection_stopped(&request);
        }
    }
}

impl<D> Dispatch<TreelandCaptureFrameV1, (), D> for CaptureState
where
    D: Dispatch<TreelandCaptureFrameV1, ()> + CaptureHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandCaptureFrameV1,
        request: treeland_capture_frame_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_capture_frame_v1::Request::Copy { buffer } => {
                state.capture_state().copy(resource, &buffer)
            }
            treeland_capture_frame_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandCaptureFrameV1, _data: &()) {
        state.capture_state().frames.remove(resource);
    }
}

impl<D> Dispatch<TreelandCaptureSessionV1, (), D> for CaptureState
where
    D: Dispatch<TreelandCaptureSessionV1, ()> + CaptureHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandCaptureSessionV1,
        request: treeland_capture_session_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let capture = state.capture_state();
        let Some(data) = capture.sessions.get_mut(resource) else {
            return;
        };
        let source_alive = capture
            .contexts
            .get_id(&data.context)
            .is_some_and(|context| context.source.is_some());
        match request {
            treeland_capture_session_v1::Request::Start => {
                if source_alive {
                    data.started = true;
                } else {
                    resource.cancel(CancelReason::Permanent as u32);
                }
            }
            treeland_capture_session_v1::Request::FrameDone => {
                data.frames_done = data.frames_done.saturating_add(1);
            }
            treeland_capture_session_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandCaptureSessionV1, _data: &()) {
        state.capture_state().sessions.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_capture {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::capture::treeland_capture_manager_v1::TreelandCaptureManagerV1: ()
        ] => $crate::extensions::capture::CaptureState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::capture::treeland_capture_manager_v1::TreelandCaptureManagerV1: ()
        ] => $crate::extensions::capture::CaptureState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::capture::treeland_capture_context_v1::TreelandCaptureContextV1: ()
        ] => $crate::extensions::capture::CaptureState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::capture::treeland_capture_frame_v1::TreelandCaptureFrameV1: ()
        ] => $crate::extensions::capture::CaptureState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::capture::treeland_capture_session_v1::TreelandCaptureSessionV1: ()
        ] => $crate::extensions::capture::CaptureState);
    };
}
