/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::error::Error;
use std::fmt;
use crate::types::LayerId;

#[derive(Clone, Debug, PartialEq)]
pub enum CompositorError {
    /// Two nodes of one layer tree share an id.
    DuplicateLayerId(LayerId),
    ShaderCompile {
        name: &'static str,
        log: String,
    },
    ProgramLink(String),
    /// The renderer side of a `RenderApi` has gone away.
    Disconnected,
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CompositorError::DuplicateLayerId(id) => {
                write!(f, "layer id {} appears more than once in the tree", id.0)
            }
            CompositorError::ShaderCompile { name, ref log } => {
                write!(f, "failed to compile shader {}: {}", name, log)
            }
            CompositorError::ProgramLink(ref log) => {
                write!(f, "failed to link shader program: {}", log)
            }
            CompositorError::Disconnected => {
                write!(f, "the renderer is no longer receiving messages")
            }
        }
    }
}

impl Error for CompositorError {}
