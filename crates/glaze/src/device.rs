// This file is dual licensed under the MIT and Apache 2.0 licenses.

//! Defines the rendering backend that shader programs are built on.

use std::error::Error;
use std::fmt;
use std::hash::Hash;

/// An independently compiled unit of a shader program.
///
/// Stages are compiled in this order: vertex, then geometry, then fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// The per-vertex stage.
    Vertex,

    /// The per-primitive stage; requires a preceding vertex stage.
    Geometry,

    /// The per-fragment stage.
    Fragment,
}

impl StageKind {
    /// The lowercase stage name, as used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Vertex => "vertex",
            StageKind::Geometry => "geometry",
            StageKind::Fragment => "fragment",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of shader stages, used to describe what a compilation request
/// needs from the context.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageSet {
    pub vertex: bool,
    pub geometry: bool,
    pub fragment: bool,
}

impl StageSet {
    /// The basic shader pipeline: a vertex and a fragment stage.
    pub const BASIC: Self = StageSet {
        vertex: true,
        geometry: false,
        fragment: true,
    };
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages = [
            (self.vertex, StageKind::Vertex),
            (self.geometry, StageKind::Geometry),
            (self.fragment, StageKind::Fragment),
        ];

        let mut any = false;
        for (requested, kind) in stages {
            if requested {
                if any {
                    f.write_str("/")?;
                }
                f.write_str(kind.name())?;
                any = true;
            }
        }

        if !any {
            f.write_str("none")?;
        }

        Ok(())
    }
}

/// Which shader stages the rendering context supports.
///
/// Probed once per device; repeated queries return the same answer for the
/// lifetime of the device. The vertex and fragment flags are set together
/// from the combined basic-pipeline probe, while geometry support is
/// queried independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub vertex: bool,
    pub geometry: bool,
    pub fragment: bool,
}

impl Capabilities {
    /// Whether every stage in `stages` is supported.
    pub fn supports(self, stages: StageSet) -> bool {
        (!stages.vertex || self.vertex)
            && (!stages.geometry || self.geometry)
            && (!stages.fragment || self.fragment)
    }
}

/// The backend a [`ShaderProgram`] drives.
///
/// This corresponds to an OpenGL context in [`glow`] terms; the method
/// names follow the GL object model so that a GL implementation is a
/// direct delegation. A non-GL implementation can stand in for tests.
///
/// Program and stage handles are plain identifiers: dropping one does not
/// release the backend object, the matching `delete_*` call does.
///
/// [`ShaderProgram`]: crate::ShaderProgram
/// [`glow`]: https://crates.io/crates/glow
pub trait Device {
    /// A linked, executable shader program.
    type Program: Clone;

    /// A single compiled (or failed) shader stage.
    type Shader;

    /// A texture resource, referenced but never owned by a program.
    type Texture;

    /// A resolved uniform variable location inside a linked program.
    type UniformLocation: Clone + Eq + Hash;

    /// The error type for backend object creation.
    type Error: Error + 'static;

    /// The stage support probed from the context.
    fn capabilities(&self) -> Capabilities;

    /// The combined texture-unit limit of the context.
    ///
    /// Queried lazily and memoized by implementations.
    fn max_texture_units(&self) -> u32;

    /// Create an empty program object.
    fn create_program(&self) -> Result<Self::Program, Self::Error>;

    /// Release a program object.
    fn delete_program(&self, program: &Self::Program);

    /// Create an empty stage object of the given kind.
    fn create_shader(&self, kind: StageKind) -> Result<Self::Shader, Self::Error>;

    /// Release a stage object.
    ///
    /// A stage already attached to a program stays alive inside it.
    fn delete_shader(&self, shader: &Self::Shader);

    /// Replace the stage's source text.
    fn shader_source(&self, shader: &Self::Shader, source: &str);

    /// Compile the stage, returning whether compilation succeeded.
    fn compile_shader(&self, shader: &Self::Shader) -> bool;

    /// The diagnostic log of the last compilation of this stage.
    fn shader_info_log(&self, shader: &Self::Shader) -> String;

    /// Attach a compiled stage to a program.
    fn attach_shader(&self, program: &Self::Program, shader: &Self::Shader);

    /// Link the program's attached stages, returning whether linking
    /// succeeded.
    fn link_program(&self, program: &Self::Program) -> bool;

    /// The diagnostic log of the last link of this program.
    fn program_info_log(&self, program: &Self::Program) -> String;

    /// The program currently activated through this device, if any.
    fn current_program(&self) -> Option<Self::Program>;

    /// Activate a program, or none.
    fn use_program(&self, program: Option<&Self::Program>);

    /// Resolve a named uniform in a linked program.
    fn uniform_location(
        &self,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;

    /// Write a scalar to the active program's uniform.
    fn uniform_1_f32(&self, location: &Self::UniformLocation, x: f32);

    /// Write a 2-component vector to the active program's uniform.
    fn uniform_2_f32(&self, location: &Self::UniformLocation, x: f32, y: f32);

    /// Write a 3-component vector to the active program's uniform.
    fn uniform_3_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32);

    /// Write a 4-component vector to the active program's uniform.
    fn uniform_4_f32(&self, location: &Self::UniformLocation, x: f32, y: f32, z: f32, w: f32);

    /// Write an integer (or sampler index) to the active program's uniform.
    fn uniform_1_i32(&self, location: &Self::UniformLocation, x: i32);

    /// Write a 4×4 column-major matrix to the active program's uniform.
    fn uniform_matrix_4_f32(&self, location: &Self::UniformLocation, matrix: &[f32; 16]);

    /// Select the active texture unit.
    fn active_texture_unit(&self, unit: u32);

    /// Bind a texture to the active texture unit.
    fn bind_texture(&self, texture: &Self::Texture);

    /// Flush pending backend commands so they are visible to every
    /// consumer of the context.
    fn flush(&self);
}
