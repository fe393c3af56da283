// This file is dual licensed under the MIT and Apache 2.0 licenses.

//! An OpenGL backend for [`glaze`] built on the [`glow`] crate.
//!
//! [`GlowDevice`] wraps any [`glow::HasContext`] and implements
//! [`glaze::Device`] by direct delegation, so a
//! [`glaze::ShaderProgram`] can be driven by whatever windowing layer
//! produced the context (glutin, sdl2, a web canvas, ...).
//!
//! Shader stage support is probed once when the device is created; the
//! combined texture-unit limit is queried lazily on first use and then
//! memoized. The device also caches which program and texture unit it last
//! activated and skips redundant GL calls, which assumes that all program
//! and texture-unit changes on this context go through the device.
//!
//! The context must be current on the calling thread whenever the device
//! is used, and the device never outlives its context.
//!
//! [`glow`]: https://crates.io/crates/glow

use glaze::{Capabilities, Device, StageKind};
use glow::HasContext;

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::hash::Hash;

/// An error reported by the OpenGL backend.
#[derive(Debug)]
pub struct GlowError(String);

impl From<String> for GlowError {
    fn from(s: String) -> Self {
        GlowError(s)
    }
}

impl fmt::Display for GlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gl error: {}", self.0)
    }
}

impl std::error::Error for GlowError {}

/// A [`glaze::Device`] over a [`glow`] context.
///
/// [`glow`]: https://crates.io/crates/glow
pub struct GlowDevice<H: HasContext> {
    context: H,
    capabilities: Capabilities,
    max_texture_units: OnceCell<u32>,
    current_program: Cell<Option<H::Program>>,
    active_unit: Cell<Option<u32>>,
}

impl<H: HasContext> GlowDevice<H> {
    /// Wrap a context, probing its shader stage support.
    ///
    /// The context must be current on the calling thread.
    pub fn new(context: H) -> Self {
        let capabilities = probe(&context);

        GlowDevice {
            context,
            capabilities,
            max_texture_units: OnceCell::new(),
            current_program: Cell::new(None),
            active_unit: Cell::new(None),
        }
    }

    /// Get a reference to the underlying [`glow`] context.
    ///
    /// [`glow`]: https://crates.io/crates/glow
    pub fn context(&self) -> &H {
        &self.context
    }

    /// Unwrap the device, returning the underlying context.
    pub fn into_context(self) -> H {
        self.context
    }

    /// Drain the context's error flag, logging anything found.
    pub fn check_error(&self) {
        let err = unsafe { self.context.get_error() };

        if err != glow::NO_ERROR {
            tracing::error!("GL error: {}", error_name(err));
        }
    }
}

impl<H: HasContext> Device for GlowDevice<H>
where
    H::UniformLocation: Eq + Hash,
{
    type Program = H::Program;
    type Shader = H::Shader;
    type Texture = H::Texture;
    type UniformLocation = H::UniformLocation;
    type Error = GlowError;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn max_texture_units(&self) -> u32 {
        *self.max_texture_units.get_or_init(|| {
            let units = unsafe {
                self.context
                    .get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS)
            };
            units.max(0) as u32
        })
    }

    fn create_program(&self) -> Result<Self::Program, GlowError> {
        unsafe { self.context.create_program().map_err(GlowError) }
    }

    fn delete_program(&self, program: &Self::Program) {
        // The driver may reuse the handle, which would poison the
        // activation cache.
        if self.current_program.get() == Some(*program) {
            self.current_program.set(None);
        }

        unsafe { self.context.delete_program(*program) }
    }

    fn create_shader(&self, kind: StageKind) -> Result<Self::Shader, GlowError> {
        unsafe { self.context.create_shader(stage_type(kind)).map_err(GlowError) }
    }

    fn delete_shader(&self, shader: &Self::Shader) {
        unsafe { self.context.delete_shader(*shader) }
    }

    fn shader_source(&self, shader: &Self::Shader, source: &str) {
        unsafe { self.context.shader_source(*shader, source) }
    }

    fn compile_shader(&self, shader: &Self::Shader) -> bool {
        unsafe {
            self.context.compile_shader(*shader);
            self.context.get_shader_compile_status(*shader)
        }
    }

    fn shader_info_log(&self, shader: &Self::Shader) -> String {
        unsafe { self.context.get_shader_info_log(*shader) }
    }

    fn attach_shader(&self, program: &Self::Program, shader: &Self::Shader) {
        unsafe { self.context.attach_shader(*program, *shader) }
    }

    fn link_program(&self, program: &Self::Program) -> bool {
        unsafe {
            self.context.link_program(*program);
            self.context.get_program_link_status(*program)
        }
    }

    fn program_info_log(&self, program: &Self::Program) -> String {
        unsafe { self.context.get_program_info_log(*program) }
    }

    fn current_program(&self) -> Option<Self::Program> {
        self.current_program.get()
    }

    fn use_program(&self, program: Option<&Self::Program>) {
        let program = program.copied();

        if self.current_program.get() != program {
            unsafe { self.context.use_program(program) };
            self.current_program.set(program);
        }
    }

    fn uniform_location(
        &self,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.context.get_uniform_location(*program, name) }
    }

    fn uniform_1_f32(&self, location: &Self::UniformLocation, x: f32) {
        unsafe { self.context.uniform_1_f32(Some(location), x) }
    }

    fn uniform_2_f32(&self, location: &Self::UniformLocation, x: f32, y: f32) {
        unsafe { self.context.uniform_2_f32(Some(location), x, y) }
    }

    fn uniform_3_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32) {
        unsafe { self.context.uniform_3_f32(Some(location), x, y, z) }
    }

    fn uniform_4_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32, w: f32) {
        unsafe { self.context.uniform_4_f32(Some(location), x, y, z, w) }
    }

    fn uniform_1_i32(&self, location: &Self::UniformLocation, x: i32) {
        unsafe { self.context.uniform_1_i32(Some(location), x) }
    }

    fn uniform_matrix_4_f32(&self, location: &Self::UniformLocation, matrix: &[f32; 16]) {
        unsafe {
            self.context
                .uniform_matrix_4_f32_slice(Some(location), false, matrix)
        }
    }

    fn active_texture_unit(&self, unit: u32) {
        if self.active_unit.get() != Some(unit) {
            unsafe { self.context.active_texture(glow::TEXTURE0 + unit) };
            self.active_unit.set(Some(unit));
        }
    }

    fn bind_texture(&self, texture: &Self::Texture) {
        unsafe { self.context.bind_texture(glow::TEXTURE_2D, Some(*texture)) }
    }

    fn flush(&self) {
        unsafe { self.context.flush() }
    }
}

/// Probe which shader stages the context supports.
///
/// The basic vertex/fragment pipeline is part of every GL and GL ES
/// version since 2.0. Geometry stages arrived in 3.2 on both flavors, with
/// `GL_ARB_geometry_shader4` as the pre-3.2 desktop fallback.
fn probe<H: HasContext>(context: &H) -> Capabilities {
    let version = context.version();
    let basic = basic_supported(&version);
    let geometry = basic
        && geometry_supported(
            &version,
            has_extension(context, "GL_ARB_geometry_shader4"),
        );

    Capabilities {
        vertex: basic,
        geometry,
        fragment: basic,
    }
}

fn basic_supported(version: &glow::Version) -> bool {
    version.major >= 2
}

fn geometry_supported(version: &glow::Version, has_extension: bool) -> bool {
    let core = version.major > 3 || (version.major == 3 && version.minor >= 2);

    if version.is_embedded {
        core
    } else {
        core || has_extension
    }
}

fn has_extension<H: HasContext>(context: &H, name: &str) -> bool {
    let extensions = context.supported_extensions();

    // WebGL reports extension names without the GL_ prefix.
    extensions.contains(name) || extensions.contains(name.trim_start_matches("GL_"))
}

fn stage_type(kind: StageKind) -> u32 {
    match kind {
        StageKind::Vertex => glow::VERTEX_SHADER,
        StageKind::Geometry => glow::GEOMETRY_SHADER,
        StageKind::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn error_name(err: u32) -> &'static str {
    match err {
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        glow::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        glow::CONTEXT_LOST => "GL_CONTEXT_LOST",
        _ => "unknown GL error",
    }
}
