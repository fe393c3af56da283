// This file is dual licensed under the MIT and Apache 2.0 licenses.

//! Source ingestion for shader programs.
//!
//! Stage text can come from a file, an in-memory string or a seekable byte
//! stream. Loading happens entirely before compilation, so a read failure
//! leaves any previously compiled program untouched.

use crate::device::{Device, StageKind};
use crate::program::{ShaderError, ShaderProgram};

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

impl<C: Device + ?Sized> ShaderProgram<C> {
    /// Load and compile a single stage from a file.
    pub fn load_from_file(
        &mut self,
        path: impl AsRef<Path>,
        kind: StageKind,
    ) -> Result<(), ShaderError> {
        let source = read_file(path.as_ref(), kind)?;
        self.compile_single(kind, &source)
    }

    /// Load and compile a vertex and a fragment stage from files.
    pub fn load_from_files(
        &mut self,
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<(), ShaderError> {
        let vertex = read_file(vertex.as_ref(), StageKind::Vertex)?;
        let fragment = read_file(fragment.as_ref(), StageKind::Fragment)?;
        self.compile(Some(&vertex), None, Some(&fragment))
    }

    /// Load and compile vertex, geometry and fragment stages from files.
    pub fn load_from_files_with_geometry(
        &mut self,
        vertex: impl AsRef<Path>,
        geometry: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<(), ShaderError> {
        let vertex = read_file(vertex.as_ref(), StageKind::Vertex)?;
        let geometry = read_file(geometry.as_ref(), StageKind::Geometry)?;
        let fragment = read_file(fragment.as_ref(), StageKind::Fragment)?;
        self.compile(Some(&vertex), Some(&geometry), Some(&fragment))
    }

    /// Compile a single stage from an in-memory source string.
    ///
    /// For a full vertex/geometry/fragment set from memory, use
    /// [`ShaderProgram::compile`] directly.
    pub fn load_from_memory(&mut self, source: &str, kind: StageKind) -> Result<(), ShaderError> {
        self.compile_single(kind, source)
    }

    /// Load and compile a single stage from a seekable stream.
    ///
    /// The stream is rewound and read to its end; the bytes must be valid
    /// UTF-8.
    pub fn load_from_stream<R: Read + Seek>(
        &mut self,
        stream: &mut R,
        kind: StageKind,
    ) -> Result<(), ShaderError> {
        let source = read_stream(stream, kind)?;
        self.compile_single(kind, &source)
    }

    fn compile_single(&mut self, kind: StageKind, source: &str) -> Result<(), ShaderError> {
        match kind {
            StageKind::Vertex => self.compile(Some(source), None, None),
            StageKind::Geometry => self.compile(None, Some(source), None),
            StageKind::Fragment => self.compile(None, None, Some(source)),
        }
    }
}

fn read_file(path: &Path, kind: StageKind) -> Result<String, ShaderError> {
    let bytes = fs::read(path).map_err(|source| {
        tracing::error!("failed to open {kind} shader file \"{}\"", path.display());
        ShaderError::Load {
            path: Some(path.to_owned()),
            source,
        }
    })?;

    into_text(bytes, Some(path), kind)
}

fn read_stream<R: Read + Seek>(stream: &mut R, kind: StageKind) -> Result<String, ShaderError> {
    let mut bytes = Vec::new();
    stream
        .seek(SeekFrom::Start(0))
        .and_then(|_| stream.read_to_end(&mut bytes))
        .map_err(|source| {
            tracing::error!("failed to read {kind} shader from stream");
            ShaderError::Load { path: None, source }
        })?;

    into_text(bytes, None, kind)
}

fn into_text(bytes: Vec<u8>, path: Option<&Path>, kind: StageKind) -> Result<String, ShaderError> {
    String::from_utf8(bytes).map_err(|err| {
        tracing::error!("{kind} shader source is not valid UTF-8");
        ShaderError::Load {
            path: path.map(Path::to_owned),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        }
    })
}
