// This file is dual licensed under the MIT and Apache 2.0 licenses.

//! The shader program component: compiling stage sources, linking, caching
//! uniform lookups and binding textures to texture units at draw time.

use crate::device::{Device, StageKind, StageSet};
use crate::CallOnDrop;

use hashbrown::HashMap;

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

/// The pass-through vertex stage synthesized when a geometry stage is
/// supplied without one.
const DEFAULT_VERTEX_SHADER: &str = include_str!("./shaders/default.v.glsl");

/// An RGBA color with integral 0–255 channels.
///
/// Channels are normalized to the 0.0–1.0 range before they are submitted
/// to a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// An opaque color from red, green and blue channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// A color from red, green, blue and alpha channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    /// The channels scaled to the 0.0–1.0 range.
    pub fn normalized(self) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        ]
    }
}

/// A shared handle to a backend texture resource.
///
/// The caller keeps ownership of the resource through its clones of this
/// handle; a [`ShaderProgram`] only ever stores a non-owning back-reference
/// to it. Releasing the backend object itself stays with the caller.
pub struct Texture<C: Device + ?Sized> {
    raw: Rc<C::Texture>,
}

impl<C: Device + ?Sized> Texture<C> {
    /// Wrap a raw backend texture handle.
    pub fn from_raw(raw: C::Texture) -> Self {
        Texture { raw: Rc::new(raw) }
    }

    /// Get the raw backend texture handle.
    pub fn raw(&self) -> &C::Texture {
        &self.raw
    }

    fn downgrade(&self) -> Weak<C::Texture> {
        Rc::downgrade(&self.raw)
    }
}

impl<C: Device + ?Sized> Clone for Texture<C> {
    fn clone(&self) -> Self {
        Texture {
            raw: self.raw.clone(),
        }
    }
}

impl<C: Device + ?Sized> fmt::Debug for Texture<C>
where
    C::Texture: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Texture").field(&self.raw).finish()
    }
}

/// An error raised while loading, compiling or binding a shader program.
///
/// Every failure is also reported as a human-readable line through the
/// [`tracing`] sink; the variants carry the same information for callers
/// that want to match on it.
#[derive(Debug)]
pub enum ShaderError {
    /// A source file or stream could not be read.
    Load {
        /// The offending path, if the source came from a file.
        path: Option<PathBuf>,
        source: io::Error,
    },

    /// The context does not support the requested shader stages.
    Unsupported(StageSet),

    /// A stage failed to compile.
    Compile { stage: StageKind, log: String },

    /// The stages compiled individually but the program failed to link.
    Link { log: String },

    /// The backend failed to create a program or stage object.
    Backend(Box<dyn Error + 'static>),
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::Load {
                path: Some(path), ..
            } => write!(f, "failed to read shader source from {}", path.display()),
            ShaderError::Load { path: None, .. } => {
                f.write_str("failed to read shader source from stream")
            }
            ShaderError::Unsupported(stages) => write!(
                f,
                "{stages} shader stages are not supported by this context"
            ),
            ShaderError::Compile { stage, .. } => write!(f, "failed to compile {stage} shader"),
            ShaderError::Link { .. } => f.write_str("failed to link shader program"),
            ShaderError::Backend(err) => write!(f, "backend error: {err}"),
        }
    }
}

impl Error for ShaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ShaderError::Load { source, .. } => Some(source),
            ShaderError::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// A GPU shader program.
///
/// Owns at most one linked backend program at a time. Compiling replaces
/// (and releases) any previously held program; a failed compilation leaves
/// the instance in the "no program" state rather than half-linked.
///
/// Uniform lookups are cached per compile generation, including negative
/// results, so a missing uniform is queried and warned about once. Texture
/// assignments claim texture units sequentially from 1 when the program is
/// [bound](ShaderProgram::bind); unit 0 is left to the drawable's own
/// texture (see [`ShaderProgram::set_current_texture`]).
pub struct ShaderProgram<C: Device + ?Sized> {
    device: Rc<C>,
    program: Option<C::Program>,
    current_texture: Option<C::UniformLocation>,
    uniforms: HashMap<String, Option<C::UniformLocation>>,
    textures: HashMap<C::UniformLocation, Weak<C::Texture>>,
}

impl<C: Device + ?Sized> ShaderProgram<C> {
    /// Create an empty shader program on the given device.
    pub fn new(device: Rc<C>) -> Self {
        ShaderProgram {
            device,
            program: None,
            current_texture: None,
            uniforms: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    /// The raw backend program handle, for interop with code that talks to
    /// the backend directly. `None` while no program is compiled.
    pub fn native_program(&self) -> Option<&C::Program> {
        self.program.as_ref()
    }

    /// Compile and link a program from up to three stage sources.
    ///
    /// Passing a geometry source without a vertex source synthesizes a
    /// default pass-through vertex stage, since geometry stages require a
    /// preceding vertex stage.
    ///
    /// Any previously held program is released and the uniform and texture
    /// state is reset before compilation starts, so a failed recompile
    /// leaves this instance with no program rather than the old one.
    pub fn compile(
        &mut self,
        vertex: Option<&str>,
        geometry: Option<&str>,
        fragment: Option<&str>,
    ) -> Result<(), ShaderError> {
        let requested = StageSet {
            vertex: vertex.is_some(),
            geometry: geometry.is_some(),
            fragment: fragment.is_some(),
        };
        let supported = self.device.capabilities().supports(requested);

        // Clean slate, even if this attempt fails below.
        self.reset();

        if !supported {
            tracing::error!(
                "failed to create shader: {requested} stages are not supported by this context"
            );
            return Err(ShaderError::Unsupported(requested));
        }

        let program = match self.device.create_program() {
            Ok(program) => program,
            Err(err) => return Err(ShaderError::Backend(Box::new(err))),
        };

        // Geometry stages cannot be the first stage of the pipeline.
        let vertex = match (vertex, geometry) {
            (None, Some(_)) => Some(DEFAULT_VERTEX_SHADER),
            (vertex, _) => vertex,
        };

        let stages = [
            (StageKind::Vertex, vertex),
            (StageKind::Geometry, geometry),
            (StageKind::Fragment, fragment),
        ];

        for (kind, source) in stages {
            let Some(source) = source else { continue };

            if let Err(err) = self.compile_stage(&program, kind, source) {
                self.device.delete_program(&program);
                return Err(err);
            }
        }

        if !self.device.link_program(&program) {
            let log = self.device.program_info_log(&program);
            tracing::error!("failed to link shader:\n{log}");
            self.device.delete_program(&program);
            return Err(ShaderError::Link { log });
        }

        self.program = Some(program);

        // Flush so the linked program is visible to all contexts sharing
        // this one before the caller starts issuing draw calls.
        self.device.flush();

        Ok(())
    }

    /// Compile one stage and attach it to `program`.
    fn compile_stage(
        &self,
        program: &C::Program,
        kind: StageKind,
        source: &str,
    ) -> Result<(), ShaderError> {
        let shader = match self.device.create_shader(kind) {
            Ok(shader) => shader,
            Err(err) => return Err(ShaderError::Backend(Box::new(err))),
        };

        self.device.shader_source(&shader, source);

        if !self.device.compile_shader(&shader) {
            let log = self.device.shader_info_log(&shader);
            tracing::error!("failed to compile {kind} shader:\n{log}");
            self.device.delete_shader(&shader);
            return Err(ShaderError::Compile { stage: kind, log });
        }

        // Attachment keeps the compiled stage alive inside the program;
        // the standalone object is no longer needed.
        self.device.attach_shader(program, &shader);
        self.device.delete_shader(&shader);

        Ok(())
    }

    /// Set a `float` uniform.
    ///
    /// Does nothing without a compiled program; a name that does not exist
    /// in the program is warned about once and then ignored.
    pub fn set_f32(&mut self, name: &str, x: f32) {
        self.set_with(name, |device, location| device.uniform_1_f32(location, x));
    }

    /// Set a 2-component vector uniform.
    pub fn set_vec2(&mut self, name: &str, v: [f32; 2]) {
        let [x, y] = v;
        self.set_with(name, |device, location| device.uniform_2_f32(location, x, y));
    }

    /// Set a 3-component vector uniform.
    pub fn set_vec3(&mut self, name: &str, v: [f32; 3]) {
        let [x, y, z] = v;
        self.set_with(name, |device, location| {
            device.uniform_3_f32(location, x, y, z)
        });
    }

    /// Set a 4-component vector uniform.
    pub fn set_vec4(&mut self, name: &str, v: [f32; 4]) {
        let [x, y, z, w] = v;
        self.set_with(name, |device, location| {
            device.uniform_4_f32(location, x, y, z, w)
        });
    }

    /// Set a color uniform, normalizing the channels to 0.0–1.0.
    pub fn set_color(&mut self, name: &str, color: Color) {
        self.set_vec4(name, color.normalized());
    }

    /// Set a 4×4 matrix uniform from column-major values.
    pub fn set_mat4(&mut self, name: &str, matrix: &[f32; 16]) {
        self.set_with(name, |device, location| {
            device.uniform_matrix_4_f32(location, matrix)
        });
    }

    /// Associate a texture with a sampler uniform.
    ///
    /// The program stores a non-owning reference; the texture must still be
    /// alive when the program is [bound](ShaderProgram::bind). Assigning to
    /// the same uniform again replaces the previous reference. A new
    /// association is rejected (and reported) when it would exceed the
    /// context's texture-unit budget.
    pub fn set_texture(&mut self, name: &str, texture: &Texture<C>) {
        if self.program.is_none() {
            return;
        }

        let Some(location) = self.uniform_location(name) else {
            return;
        };

        if self.textures.contains_key(&location) {
            self.textures.insert(location, texture.downgrade());
            return;
        }

        // Unit 0 stays reserved for the drawable's current texture, so a
        // program may claim at most `limit - 1` units of its own.
        let limit = self.device.max_texture_units() as usize;
        if self.textures.len() + 1 >= limit {
            tracing::error!(
                "impossible to use texture \"{name}\" for shader: \
                 all available texture units are used"
            );
            return;
        }

        self.textures.insert(location, texture.downgrade());
    }

    /// Make a sampler uniform read the drawable's current texture.
    ///
    /// The uniform is pointed at texture unit 0 every time the program is
    /// bound; no texture unit is claimed for it.
    pub fn set_current_texture(&mut self, name: &str) {
        if self.program.is_none() {
            return;
        }

        self.current_texture = self.uniform_location(name);
    }

    /// Activate this program and populate its texture units.
    ///
    /// Texture units are claimed sequentially from 1, one per texture
    /// association, and unit 0 is selected again afterwards so unrelated
    /// texture operations keep targeting it. The bindings stay valid until
    /// they are changed again; the caller issues its draw calls in
    /// between.
    ///
    /// Binding an instance that holds no compiled program deactivates any
    /// active program, like [`ShaderProgram::unbind`].
    pub fn bind(&self) -> Result<(), ShaderError> {
        let device = &self.device;

        if !device.capabilities().supports(StageSet::BASIC) {
            tracing::error!(
                "failed to bind or unbind shader: shaders are not supported by this context"
            );
            return Err(ShaderError::Unsupported(StageSet::BASIC));
        }

        let Some(program) = self.program.as_ref() else {
            device.use_program(None);
            return Ok(());
        };

        device.use_program(Some(program));

        let mut unit = 0u32;
        for (location, texture) in &self.textures {
            unit += 1;

            match texture.upgrade() {
                Some(texture) => {
                    device.uniform_1_i32(location, unit as i32);
                    device.active_texture_unit(unit);
                    device.bind_texture(&texture);
                }
                None => {
                    tracing::warn!(
                        "texture assigned to texture unit {unit} no longer exists; \
                         leaving the unit unbound"
                    );
                }
            }
        }

        if let Some(location) = &self.current_texture {
            device.uniform_1_i32(location, 0);
        }

        // Leave unit 0 active for whatever the caller does next.
        device.active_texture_unit(0);

        Ok(())
    }

    /// Deactivate any active program.
    pub fn unbind(device: &C) {
        if !device.capabilities().supports(StageSet::BASIC) {
            tracing::error!(
                "failed to bind or unbind shader: shaders are not supported by this context"
            );
            return;
        }

        device.use_program(None);
    }

    /// Resolve a uniform location through the cache.
    ///
    /// Negative results are cached too, so the backend is queried (and a
    /// missing name warned about) once per name per compile generation.
    fn uniform_location(&mut self, name: &str) -> Option<C::UniformLocation> {
        let program = self.program.as_ref()?;

        if let Some(cached) = self.uniforms.get(name) {
            return cached.clone();
        }

        let location = self.device.uniform_location(program, name);
        if location.is_none() {
            tracing::warn!("parameter \"{name}\" not found in shader");
        }

        self.uniforms.insert(name.to_owned(), location.clone());
        location
    }

    /// Resolve `name` and perform a typed uniform write with this program
    /// temporarily active, restoring the previously active program on the
    /// way out.
    fn set_with(&mut self, name: &str, write: impl FnOnce(&C, &C::UniformLocation)) {
        let Some(program) = self.program.clone() else {
            return;
        };

        let device = self.device.clone();
        let previous = device.current_program();
        device.use_program(Some(&program));
        let _restore = CallOnDrop(|| device.use_program(previous.as_ref()));

        if let Some(location) = self.uniform_location(name) {
            write(&device, &location);
        }
    }

    /// Release the held program and drop all per-program state.
    fn reset(&mut self) {
        if let Some(program) = self.program.take() {
            self.device.delete_program(&program);
        }

        self.current_texture = None;
        self.uniforms.clear();
        self.textures.clear();
    }
}

impl<C: Device + ?Sized> Drop for ShaderProgram<C> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.device.delete_program(&program);
        }
    }
}

impl<C: Device + ?Sized> fmt::Debug for ShaderProgram<C>
where
    C::Program: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("program", &self.program)
            .field("textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}
