// This file is dual licensed under the MIT and Apache 2.0 licenses.

//! A scripted in-memory [`Device`] for unit tests.
//!
//! Stage compilation and program linking are driven by magic markers in the
//! source text: a stage whose source contains `compile-error` fails to
//! compile, and a program with an attached stage containing `link-error`
//! fails to link. Uniform names must be declared up front with
//! [`FakeDevice::uniform`]; everything else resolves to "not found".
//!
//! Every backend call is recorded in a ledger that tests inspect through
//! [`FakeDevice::snapshot`].

use crate::device::{Capabilities, Device, StageKind};

use hashbrown::HashMap;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// The error type of the fake backend; object creation never fails.
#[derive(Debug)]
pub(crate) struct FakeError;

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fake device error")
    }
}

impl std::error::Error for FakeError {}

/// A stage that compiled successfully, in compilation order.
#[derive(Debug, Clone)]
pub(crate) struct CompiledStage {
    pub(crate) kind: StageKind,
    pub(crate) source: String,
}

/// A single typed uniform write, together with the program that was active
/// when it happened.
#[derive(Debug, Clone)]
pub(crate) struct WriteRecord {
    pub(crate) program: Option<u32>,
    pub(crate) location: u32,
    pub(crate) value: UniformWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UniformWrite {
    F1(f32),
    F2(f32, f32),
    F3(f32, f32, f32),
    F4(f32, f32, f32, f32),
    I1(i32),
    Mat4([f32; 16]),
}

/// Everything the fake backend has observed.
#[derive(Debug, Default, Clone)]
pub(crate) struct Ledger {
    pub(crate) created_programs: u32,
    pub(crate) live_programs: Vec<u32>,
    pub(crate) live_shaders: Vec<u32>,
    pub(crate) compiled_stages: Vec<CompiledStage>,
    pub(crate) current_program: Option<u32>,
    pub(crate) active_unit: u32,
    pub(crate) bound_textures: HashMap<u32, u32>,
    pub(crate) uniform_writes: Vec<WriteRecord>,
    pub(crate) location_queries: Vec<String>,
    pub(crate) flushes: u32,
}

#[derive(Debug, Default)]
struct Objects {
    next_handle: u32,
    shader_kinds: HashMap<u32, StageKind>,
    shader_sources: HashMap<u32, String>,
    attachments: HashMap<u32, Vec<u32>>,
}

pub(crate) struct FakeDevice {
    capabilities: Cell<Capabilities>,
    max_texture_units: Cell<u32>,
    uniforms: RefCell<HashMap<String, u32>>,
    objects: RefCell<Objects>,
    ledger: RefCell<Ledger>,
}

impl FakeDevice {
    /// A device supporting every stage, with a comfortable unit budget and
    /// no known uniforms.
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(FakeDevice {
            capabilities: Cell::new(Capabilities {
                vertex: true,
                geometry: true,
                fragment: true,
            }),
            max_texture_units: Cell::new(16),
            uniforms: RefCell::new(HashMap::new()),
            objects: RefCell::new(Objects::default()),
            ledger: RefCell::new(Ledger::default()),
        })
    }

    pub(crate) fn with_capabilities(self: Rc<Self>, capabilities: Capabilities) -> Rc<Self> {
        self.capabilities.set(capabilities);
        self
    }

    pub(crate) fn with_max_texture_units(self: Rc<Self>, limit: u32) -> Rc<Self> {
        self.max_texture_units.set(limit);
        self
    }

    /// Declare a uniform that linked programs will resolve.
    ///
    /// Locations are assigned sequentially from 1 in declaration order.
    pub(crate) fn uniform(self: Rc<Self>, name: &str) -> Rc<Self> {
        let mut uniforms = self.uniforms.borrow_mut();
        let location = uniforms.len() as u32 + 1;
        uniforms.insert(name.to_owned(), location);
        drop(uniforms);
        self
    }

    /// The location a declared uniform resolves to.
    pub(crate) fn location_of(&self, name: &str) -> u32 {
        self.uniforms.borrow()[name]
    }

    pub(crate) fn snapshot(&self) -> Ledger {
        self.ledger.borrow().clone()
    }

    fn next_handle(&self) -> u32 {
        let mut objects = self.objects.borrow_mut();
        objects.next_handle += 1;
        objects.next_handle
    }
}

impl Device for FakeDevice {
    type Program = u32;
    type Shader = u32;
    type Texture = u32;
    type UniformLocation = u32;
    type Error = FakeError;

    fn capabilities(&self) -> Capabilities {
        self.capabilities.get()
    }

    fn max_texture_units(&self) -> u32 {
        self.max_texture_units.get()
    }

    fn create_program(&self) -> Result<u32, FakeError> {
        let handle = self.next_handle();
        let mut ledger = self.ledger.borrow_mut();
        ledger.created_programs += 1;
        ledger.live_programs.push(handle);
        Ok(handle)
    }

    fn delete_program(&self, program: &u32) {
        self.ledger
            .borrow_mut()
            .live_programs
            .retain(|handle| handle != program);
    }

    fn create_shader(&self, kind: StageKind) -> Result<u32, FakeError> {
        let handle = self.next_handle();
        self.objects.borrow_mut().shader_kinds.insert(handle, kind);
        self.ledger.borrow_mut().live_shaders.push(handle);
        Ok(handle)
    }

    fn delete_shader(&self, shader: &u32) {
        self.ledger
            .borrow_mut()
            .live_shaders
            .retain(|handle| handle != shader);
    }

    fn shader_source(&self, shader: &u32, source: &str) {
        self.objects
            .borrow_mut()
            .shader_sources
            .insert(*shader, source.to_owned());
    }

    fn compile_shader(&self, shader: &u32) -> bool {
        let objects = self.objects.borrow();
        let source = objects.shader_sources.get(shader).cloned().unwrap_or_default();
        let kind = objects.shader_kinds[shader];
        drop(objects);

        if source.contains("compile-error") {
            return false;
        }

        self.ledger
            .borrow_mut()
            .compiled_stages
            .push(CompiledStage { kind, source });
        true
    }

    fn shader_info_log(&self, _shader: &u32) -> String {
        "scripted compile failure".to_owned()
    }

    fn attach_shader(&self, program: &u32, shader: &u32) {
        self.objects
            .borrow_mut()
            .attachments
            .entry(*program)
            .or_default()
            .push(*shader);
    }

    fn link_program(&self, program: &u32) -> bool {
        let objects = self.objects.borrow();
        let attached = objects.attachments.get(program);

        !attached
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .any(|shader| {
                objects
                    .shader_sources
                    .get(shader)
                    .map_or(false, |source| source.contains("link-error"))
            })
    }

    fn program_info_log(&self, _program: &u32) -> String {
        "scripted link failure".to_owned()
    }

    fn current_program(&self) -> Option<u32> {
        self.ledger.borrow().current_program
    }

    fn use_program(&self, program: Option<&u32>) {
        self.ledger.borrow_mut().current_program = program.copied();
    }

    fn uniform_location(&self, _program: &u32, name: &str) -> Option<u32> {
        self.ledger
            .borrow_mut()
            .location_queries
            .push(name.to_owned());
        self.uniforms.borrow().get(name).copied()
    }

    fn uniform_1_f32(&self, location: &u32, x: f32) {
        self.record_write(*location, UniformWrite::F1(x));
    }

    fn uniform_2_f32(&self, location: &u32, x: f32, y: f32) {
        self.record_write(*location, UniformWrite::F2(x, y));
    }

    fn uniform_3_f32(&self, location: &u32, x: f32, y: f32, z: f32) {
        self.record_write(*location, UniformWrite::F3(x, y, z));
    }

    fn uniform_4_f32(&self, location: &u32, x: f32, y: f32, z: f32, w: f32) {
        self.record_write(*location, UniformWrite::F4(x, y, z, w));
    }

    fn uniform_1_i32(&self, location: &u32, x: i32) {
        self.record_write(*location, UniformWrite::I1(x));
    }

    fn uniform_matrix_4_f32(&self, location: &u32, matrix: &[f32; 16]) {
        self.record_write(*location, UniformWrite::Mat4(*matrix));
    }

    fn active_texture_unit(&self, unit: u32) {
        self.ledger.borrow_mut().active_unit = unit;
    }

    fn bind_texture(&self, texture: &u32) {
        let mut ledger = self.ledger.borrow_mut();
        let unit = ledger.active_unit;
        ledger.bound_textures.insert(unit, *texture);
    }

    fn flush(&self) {
        self.ledger.borrow_mut().flushes += 1;
    }
}

impl FakeDevice {
    fn record_write(&self, location: u32, value: UniformWrite) {
        let mut ledger = self.ledger.borrow_mut();
        let program = ledger.current_program;
        ledger.uniform_writes.push(WriteRecord {
            program,
            location,
            value,
        });
    }
}
