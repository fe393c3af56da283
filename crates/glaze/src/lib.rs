// This file is dual licensed under the MIT and Apache 2.0 licenses.

//! GPU shader program management over an abstract rendering backend.
//!
//! The centerpiece of this crate is the [`ShaderProgram`] structure, which
//! compiles stage sources into a linked program on a [`Device`], caches
//! uniform-variable lookups, and binds textures to texture units when the
//! program is activated for drawing. The [`Device`] trait is the seam to
//! the actual graphics API; the `glaze-glow` crate implements it for
//! OpenGL through [`glow`], and tests drive the same logic with an
//! in-memory backend.
//!
//! A program is compiled from up to three stage sources (vertex, geometry,
//! fragment). Compilation needs the stages to be supported by the context
//! (see [`Device::capabilities`]) and replaces any previously held
//! program; a failed attempt always leaves the instance without a program
//! rather than half-linked. Parameters are set by uniform name any number
//! of times between draws, and texture-valued uniforms each claim a
//! private texture unit when the program is bound.
//!
//! Failures are reported as human-readable lines through [`tracing`] in
//! addition to the returned error values.
//!
//! [`glow`]: https://crates.io/crates/glow

mod device;
#[cfg(test)]
mod fake;
mod program;
mod source;

pub use device::{Capabilities, Device, StageKind, StageSet};
pub use program::{Color, ShaderError, ShaderProgram, Texture};

/// Runs a closure when dropped, whatever the exit path.
pub(crate) struct CallOnDrop<F: FnMut()>(pub(crate) F);

impl<F: FnMut()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}
