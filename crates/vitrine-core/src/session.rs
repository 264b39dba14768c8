//! Viewer session: asset lifecycle, presentation state and the draw loop
//!
//! A session owns one camera, one set of orbit controls, one light, at most
//! one attached asset and at most one animation controller. Loads are split
//! into [`begin_load`](ViewerSession::begin_load), an awaitable
//! [`PendingLoad::decode`] and [`finish_load`](ViewerSession::finish_load), so
//! the host can keep drawing and configuring while a decode is in flight.
//! The previous asset is only torn down once the new one has decoded; a
//! failed load leaves the viewport exactly as it was.

use crate::animation::AnimationController;
use crate::asset::{Asset, AssetId, Bundle, DecodedAsset};
use crate::broker::{AssetDecoder, HandleStats, ResourceUrlBroker};
use crate::camera::{CameraConfig, OrbitControls, PerspectiveCamera, Viewport};
use crate::error::{DecodeError, Outcome, ViewerError};
use crate::framer::{frame, Framing, FramingParams};
use crate::options::{Presentation, ViewerOptions};
use crate::render::{Frame, Renderer};
use crate::scene::{AmbientLight, Background, BoundingBoxOverlay, Color};
use crate::scheduler::{FrameClock, FrameScheduler};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Empty,
    Loading,
    Ready,
}

/// Ticket for one load; only the most recently begun ticket may finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadId(u64);

impl LoadId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A load that has been admitted but not yet decoded
///
/// Owns everything the decode needs, so awaiting it does not borrow the session.
pub struct PendingLoad<D> {
    id: LoadId,
    bundle: Bundle,
    decoder: Arc<D>,
    broker: ResourceUrlBroker,
}

impl<D: AssetDecoder> PendingLoad<D> {
    pub fn id(&self) -> LoadId {
        self.id
    }

    pub fn primary(&self) -> &str {
        &self.bundle.primary
    }

    /// Run the decode. Temporary handles are released before this returns.
    pub async fn decode(self) -> LoadResult {
        let Bundle { primary, blobs } = self.bundle;
        let result = self.broker.load(&*self.decoder, &primary, blobs).await;
        LoadResult {
            id: self.id,
            primary,
            result,
        }
    }
}

/// Outcome of [`PendingLoad::decode`], to be handed to
/// [`ViewerSession::finish_load`]
#[derive(Debug)]
pub struct LoadResult {
    id: LoadId,
    primary: String,
    result: Result<DecodedAsset, DecodeError>,
}

impl LoadResult {
    pub fn id(&self) -> LoadId {
        self.id
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// What a successful load attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub asset: AssetId,
    pub source: String,
    pub clips: Vec<String>,
    pub framing: Framing,
    /// Asset that was torn down to make room, if any
    pub replaced: Option<AssetId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unloaded {
    Unloaded(AssetId),
    AlreadyEmpty,
}

type PostDrawHook = Box<dyn FnOnce()>;
type HookSlot = RefCell<Option<(u64, PostDrawHook)>>;

/// Returned by [`ViewerSession::on_post_draw`]
#[derive(Debug)]
pub struct PostDrawHandle {
    slot: Weak<HookSlot>,
    token: u64,
}

impl PostDrawHandle {
    /// Remove the hook if it is still registered and has not fired.
    /// Returns false if it already fired or was replaced.
    pub fn unregister(self) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some((token, _)) if *token == self.token => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

pub struct ViewerSession<D, R> {
    decoder: Arc<D>,
    renderer: R,
    broker: ResourceUrlBroker,
    scheduler: FrameScheduler,
    clock: FrameClock,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    viewport: Viewport,
    options: ViewerOptions,
    framing: FramingParams,
    last_framing: Framing,
    overlay_color: Color,
    overlay: Option<BoundingBoxOverlay>,
    asset: Option<Asset>,
    animation: Option<AnimationController>,
    in_flight: Option<LoadId>,
    next_load: u64,
    next_asset: u64,
    post_draw: Rc<HookSlot>,
    next_hook: u64,
    draws: u64,
}

impl<D: AssetDecoder, R: Renderer> ViewerSession<D, R> {
    pub fn new(decoder: Arc<D>, renderer: R, camera: CameraConfig) -> Self {
        Self {
            decoder,
            renderer,
            broker: ResourceUrlBroker::new(),
            scheduler: FrameScheduler::new(),
            clock: FrameClock::new(),
            camera: PerspectiveCamera::new(&camera),
            controls: OrbitControls::default(),
            viewport: Viewport::default(),
            options: ViewerOptions::default(),
            framing: FramingParams::default(),
            last_framing: Framing::NotApplicable,
            overlay_color: Color::GREEN,
            overlay: None,
            asset: None,
            animation: None,
            in_flight: None,
            next_load: 0,
            next_asset: 0,
            post_draw: Rc::new(RefCell::new(None)),
            next_hook: 0,
            draws: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.in_flight.is_some() {
            SessionState::Loading
        } else if self.asset.is_some() {
            SessionState::Ready
        } else {
            SessionState::Empty
        }
    }

    /// Admit a load. Fails with [`ViewerError::LoadInFlight`] while another
    /// load has not finished.
    pub fn begin_load(&mut self, bundle: Bundle) -> Result<PendingLoad<D>, ViewerError> {
        if self.in_flight.is_some() {
            return Err(ViewerError::LoadInFlight);
        }
        if bundle.primary.trim().is_empty() {
            return Err(ViewerError::invalid("primary", "document name is empty"));
        }
        self.next_load += 1;
        let id = LoadId(self.next_load);
        self.in_flight = Some(id);
        info!(
            load = id.0,
            primary = %bundle.primary,
            blobs = bundle.blobs.len(),
            "Loading asset"
        );
        Ok(PendingLoad {
            id,
            bundle,
            decoder: Arc::clone(&self.decoder),
            broker: self.broker.clone(),
        })
    }

    /// Give up on an admitted load whose decode will never be finished
    pub fn cancel_load(&mut self, id: LoadId) -> bool {
        if self.in_flight == Some(id) {
            self.in_flight = None;
            info!(load = id.0, "Load cancelled");
            true
        } else {
            false
        }
    }

    /// Attach a decoded asset, replacing the current one, or report the failure
    /// with the current asset left in place
    pub fn finish_load(&mut self, loaded: LoadResult) -> Result<LoadReport, ViewerError> {
        if self.in_flight != Some(loaded.id) {
            return Err(ViewerError::StaleLoad(loaded.id.0));
        }
        self.in_flight = None;

        let decoded = match loaded.result {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    load = loaded.id.0,
                    primary = %loaded.primary,
                    error = %e,
                    kept = ?self.asset.as_ref().map(|a| a.id),
                    "Failed to load asset"
                );
                return Err(ViewerError::Decode(e));
            }
        };

        self.next_asset += 1;
        let asset = Asset::new(AssetId(self.next_asset), loaded.primary, decoded);
        let replaced = self.teardown_current();
        let report = self.attach(asset, replaced);
        info!(
            asset = %report.asset,
            source = %report.source,
            clips = report.clips.len(),
            framed = report.framing.placement().is_some(),
            replaced = ?report.replaced,
            "Loaded asset"
        );
        Ok(report)
    }

    /// Begin, decode and finish in one call
    pub async fn load_asset(&mut self, bundle: Bundle) -> Result<LoadReport, ViewerError> {
        let pending = self.begin_load(bundle)?;
        let loaded = pending.decode().await;
        self.finish_load(loaded)
    }

    pub fn unload_asset(&mut self) -> Unloaded {
        match self.teardown_current() {
            Some(id) => {
                self.last_framing = Framing::NotApplicable;
                self.scheduler.request_frame();
                info!(asset = %id, "Unloaded asset");
                Unloaded::Unloaded(id)
            }
            None => {
                debug!("Unload requested with no asset attached");
                Unloaded::AlreadyEmpty
            }
        }
    }

    /// Tear down the attached asset: animation first, then overlay, then GPU
    /// resources, then the node tree itself
    fn teardown_current(&mut self) -> Option<AssetId> {
        if let Some(controller) = self.animation.take() {
            controller.destroy();
        }
        self.overlay = None;
        let asset = self.asset.take()?;
        self.renderer.release(&asset);
        // clip selection belongs to the asset it was made for
        self.options.animation_clips.clear();
        Some(asset.id)
    }

    fn attach(&mut self, mut asset: Asset, replaced: Option<AssetId>) -> LoadReport {
        let wireframe = self.options.wireframe;
        asset
            .root
            .for_each_material_mut(&mut |m| m.wireframe = wireframe);
        let report_id = asset.id;
        let source = asset.source.clone();
        let clips = asset.clip_names();
        self.asset = Some(asset);

        self.reframe();
        self.refresh_overlay();
        self.play_persisted_clips();
        self.clock.reset();
        self.scheduler.request_frame();

        LoadReport {
            asset: report_id,
            source,
            clips,
            framing: self.last_framing,
            replaced,
        }
    }

    fn play_persisted_clips(&mut self) {
        let wanted = self.options.animation_clips.clone();
        if wanted.is_empty() {
            return;
        }
        let mut played = Vec::new();
        for name in wanted {
            match self.start_clip(&name) {
                Ok(()) => played.push(name),
                Err(e) => warn!(clip = %name, error = %e, "Skipping configured clip"),
            }
        }
        self.options.animation_clips = played;
    }

    fn reframe(&mut self) {
        let bounds = self.asset.as_ref().map(|a| a.world_bounds());
        self.last_framing = frame(bounds.as_ref(), self.framing);
        if let Framing::Placed(placement) = &self.last_framing {
            placement.apply(&mut self.camera, &mut self.controls);
        }
    }

    fn refresh_overlay(&mut self) {
        self.overlay = match (&self.asset, self.options.bounding_box_overlay) {
            (Some(asset), true) => {
                let bounds = asset.world_bounds();
                (!bounds.is_empty()).then_some(BoundingBoxOverlay {
                    color: self.overlay_color,
                    bounds,
                })
            }
            _ => None,
        };
    }

    fn outcome(&self) -> Outcome {
        if self.asset.is_some() {
            Outcome::Applied
        } else {
            Outcome::NoAssetLoaded
        }
    }

    /// Request a redraw if an asset is attached; report the outcome either way
    fn applied_to_asset(&self) -> Outcome {
        let outcome = self.outcome();
        if outcome.is_applied() {
            self.scheduler.request_frame();
        }
        outcome
    }

    /// The animation controller, created on first use for an asset with clips
    pub fn ensure_animation(&mut self) -> Option<&mut AnimationController> {
        if self.animation.is_none() {
            let controller = self.asset.as_ref().and_then(AnimationController::bind);
            if let Some(mut controller) = controller {
                // speed was validated when persisted
                let _ = controller.set_speed(self.options.animation_speed);
                self.animation = Some(controller);
            }
        }
        self.animation.as_mut()
    }

    fn start_clip(&mut self, name: &str) -> Result<(), ViewerError> {
        let Some(asset) = self.asset.as_ref() else {
            return Ok(());
        };
        if asset.clip(name).is_none() {
            return Err(ViewerError::ClipNotFound(name.to_string()));
        }
        if self.ensure_animation().is_none() {
            return Err(ViewerError::ClipNotFound(name.to_string()));
        }
        match (self.animation.as_mut(), self.asset.as_ref()) {
            (Some(controller), Some(asset)) => controller.play(asset, name),
            _ => Err(ViewerError::ClipNotFound(name.to_string())),
        }
    }

    /// Play `name` alongside whatever is already playing
    pub fn play_clip(&mut self, name: &str) -> Result<Outcome, ViewerError> {
        if self.asset.is_none() {
            return Ok(Outcome::NoAssetLoaded);
        }
        self.start_clip(name)?;
        if !self.options.animation_clips.iter().any(|c| c == name) {
            self.options.animation_clips.push(name.to_string());
        }
        self.scheduler.request_frame();
        Ok(Outcome::Applied)
    }

    /// Stop `name`, leaving other clips playing
    pub fn stop_clip(&mut self, name: &str) -> Result<Outcome, ViewerError> {
        let Some(asset) = self.asset.as_ref() else {
            return Ok(Outcome::NoAssetLoaded);
        };
        if asset.clip(name).is_none() {
            return Err(ViewerError::ClipNotFound(name.to_string()));
        }
        if let Some(controller) = self.animation.as_mut() {
            controller.stop(name);
        }
        self.options.animation_clips.retain(|c| c != name);
        self.scheduler.request_frame();
        Ok(Outcome::Applied)
    }

    pub fn active_clips(&self) -> Vec<String> {
        self.animation
            .as_ref()
            .map(|c| c.active_clips().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Flip the bounding-box overlay; returns the new setting
    pub fn toggle_overlay(&mut self) -> bool {
        let enabled = !self.options.bounding_box_overlay;
        // a boolean toggle cannot fail validation
        let _ = self.set_bounding_box_overlay(enabled);
        enabled
    }

    pub fn set_overlay_color(&mut self, color: Color) -> Outcome {
        self.overlay_color = color;
        self.refresh_overlay();
        self.applied_to_asset()
    }

    pub fn overlay_color(&self) -> Color {
        self.overlay_color
    }

    /// Resize to the display; the camera aspect follows on the next draw
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let viewport = Viewport::new(width, height);
        if viewport != self.viewport {
            self.viewport = viewport;
            self.scheduler.request_frame();
        }
    }

    /// Forward an orbit drag. Returns false if controls are disabled.
    pub fn orbit(&mut self, d_azimuth: f32, d_polar: f32) -> bool {
        if !self.controls.enabled {
            return false;
        }
        self.controls.rotate(d_azimuth, d_polar);
        self.scheduler.request_frame();
        true
    }

    /// Forward a wheel or pinch. Returns false if controls are disabled.
    pub fn dolly(&mut self, scale: f32) -> bool {
        if !self.controls.enabled {
            return false;
        }
        self.controls.dolly(scale);
        self.scheduler.request_frame();
        true
    }

    /// Register a callback to run once, right after the next completed draw.
    /// Replaces any hook that has not fired yet.
    pub fn on_post_draw(&mut self, hook: impl FnOnce() + 'static) -> PostDrawHandle {
        self.next_hook += 1;
        let token = self.next_hook;
        *self.post_draw.borrow_mut() = Some((token, Box::new(hook)));
        PostDrawHandle {
            slot: Rc::downgrade(&self.post_draw),
            token,
        }
    }

    /// Display-refresh callback. Draws if a frame is pending; returns whether it drew.
    pub fn on_refresh(&mut self, timestamp: f64) -> bool {
        if !self.scheduler.take_pending() {
            return false;
        }
        self.draw(timestamp);
        true
    }

    fn draw(&mut self, timestamp: f64) {
        let delta = self.clock.tick(timestamp);
        self.camera.fit_viewport(self.viewport);

        // requests made here land in the next interval
        if self.controls.update(&mut self.camera, delta) {
            self.scheduler.request_frame();
        }
        if let (Some(controller), Some(asset)) = (self.animation.as_mut(), self.asset.as_mut()) {
            if controller.is_playing() {
                if let Err(e) = controller.update(asset, delta) {
                    warn!(error = %e, "Animation update skipped");
                }
                self.scheduler.request_frame();
            }
        }
        self.refresh_overlay();

        let frame = Frame {
            timestamp,
            delta,
            viewport: self.viewport,
            camera: &self.camera,
            background: Background {
                color: self.options.background_color,
                opacity: self.options.background_opacity,
            },
            light: AmbientLight {
                color: self.options.light_color,
                intensity: self.options.light_intensity,
            },
            asset: self.asset.as_ref(),
            overlay: self.overlay.as_ref(),
        };
        self.renderer.render(&frame);
        self.draws += 1;

        if !self.scheduler.is_pending() {
            // idle until the next request; don't count the gap as elapsed time
            self.clock.reset();
        }

        let hook = self.post_draw.borrow_mut().take();
        if let Some((token, hook)) = hook {
            debug!(hook = token, draw = self.draws, "Running post-draw hook");
            hook();
        }
    }

    /// Ask for a redraw on the next refresh
    pub fn request_frame(&self) -> bool {
        self.scheduler.request_frame()
    }

    /// Shared handle for callers that need to request frames on their own
    pub fn scheduler(&self) -> FrameScheduler {
        self.scheduler.clone()
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn framing_params(&self) -> FramingParams {
        self.framing
    }

    pub fn last_framing(&self) -> Framing {
        self.last_framing
    }

    pub fn asset(&self) -> Option<&Asset> {
        self.asset.as_ref()
    }

    pub fn animation(&self) -> Option<&AnimationController> {
        self.animation.as_ref()
    }

    pub fn overlay(&self) -> Option<&BoundingBoxOverlay> {
        self.overlay.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.broker.stats()
    }

    /// Completed draws
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl<D: AssetDecoder, R: Renderer> Presentation for ViewerSession<D, R> {
    fn options(&self) -> &ViewerOptions {
        &self.options
    }

    /// Background is part of the empty viewport too, so it always redraws
    fn set_background(&mut self, color: Color, opacity: f32) -> Result<Outcome, ViewerError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ViewerError::invalid(
                "backgroundOpacity",
                format!("must lie in [0, 1], got {opacity}"),
            ));
        }
        self.options.background_color = color;
        self.options.background_opacity = opacity;
        self.scheduler.request_frame();
        Ok(self.outcome())
    }

    fn set_light(&mut self, color: Color, intensity: f32) -> Result<Outcome, ViewerError> {
        if !intensity.is_finite() || intensity < 0.0 {
            return Err(ViewerError::invalid(
                "lightIntensity",
                format!("must be a non-negative number, got {intensity}"),
            ));
        }
        self.options.light_color = color;
        self.options.light_intensity = intensity;
        self.scheduler.request_frame();
        Ok(self.outcome())
    }

    /// Negative speeds turn the other way; zero stops
    fn set_auto_rotate(&mut self, speed: f32) -> Result<Outcome, ViewerError> {
        if !speed.is_finite() {
            return Err(ViewerError::invalid(
                "autoRotateSpeed",
                format!("must be finite, got {speed}"),
            ));
        }
        self.options.auto_rotate_speed = speed;
        self.controls.auto_rotate = speed != 0.0;
        self.controls.auto_rotate_speed = speed;
        self.scheduler.request_frame();
        Ok(self.outcome())
    }

    fn enable_controls(&mut self, enabled: bool) -> Result<Outcome, ViewerError> {
        self.options.controls_enabled = enabled;
        self.controls.enabled = enabled;
        Ok(self.applied_to_asset())
    }

    fn set_wireframe(&mut self, enabled: bool) -> Result<Outcome, ViewerError> {
        self.options.wireframe = enabled;
        if let Some(asset) = self.asset.as_mut() {
            asset
                .root
                .for_each_material_mut(&mut |m| m.wireframe = enabled);
        }
        Ok(self.applied_to_asset())
    }

    fn set_bounding_box_overlay(&mut self, enabled: bool) -> Result<Outcome, ViewerError> {
        self.options.bounding_box_overlay = enabled;
        self.refresh_overlay();
        Ok(self.applied_to_asset())
    }

    fn set_framing(&mut self, zoom: f32, vertical_offset: f32) -> Result<Outcome, ViewerError> {
        let params = FramingParams::new(zoom, vertical_offset)?;
        self.framing = params;
        self.options.zoom = params.zoom();
        self.options.vertical_offset = params.vertical_offset();
        if self.asset.is_some() {
            self.reframe();
        }
        Ok(self.applied_to_asset())
    }

    /// Make exactly `clips` play: listed clips start, unlisted ones stop.
    /// Every name must exist on the attached asset or nothing changes.
    fn set_animation_clips(&mut self, clips: &[String]) -> Result<Outcome, ViewerError> {
        let Some(asset) = self.asset.as_ref() else {
            self.options.animation_clips = clips.to_vec();
            return Ok(Outcome::NoAssetLoaded);
        };
        if let Some(missing) = clips.iter().find(|name| asset.clip(name).is_none()) {
            return Err(ViewerError::ClipNotFound(missing.clone()));
        }

        let active = self.active_clips();
        if let Some(controller) = self.animation.as_mut() {
            for name in active.iter().filter(|a| !clips.contains(a)) {
                controller.stop(name);
            }
        }
        for name in clips.iter().filter(|c| !active.contains(c)) {
            self.start_clip(name)?;
        }
        self.options.animation_clips = clips.to_vec();
        Ok(self.applied_to_asset())
    }

    fn set_animation_speed(&mut self, speed: f32) -> Result<Outcome, ViewerError> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(ViewerError::invalid(
                "animationSpeed",
                format!("must be a non-negative number, got {speed}"),
            ));
        }
        self.options.animation_speed = speed;
        if let Some(controller) = self.animation.as_mut() {
            controller.set_speed(speed)?;
        }
        Ok(self.applied_to_asset())
    }
}
