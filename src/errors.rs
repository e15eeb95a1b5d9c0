/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CodegenError {
    /// A fixed resource of the instruction format ran out: more than 511
    /// live registers, or more than 256 method symbols in one unit.
    #[error("codegen error:{file}:{line}: {reason}")]
    Capacity { file: String, line: u16, reason: String },

    /// The tree asks for something with no valid surrounding construct,
    /// e.g. `break` outside of any loop.
    #[error("codegen error:{file}:{line}: {reason}")]
    Structural { file: String, line: u16, reason: String },

    /// Malformed literal data handed over by the parser.
    #[error("codegen error:{file}:{line}: {reason}")]
    Input { file: String, line: u16, reason: String },

    /// An internal invariant was violated; always a bug in the generator.
    #[error("codegen bug: {reason}")]
    Internal { reason: String },

    /// A compiled unit failed post-generation verification.
    #[error("irep verification failed: {reason}")]
    Verify { reason: String },
}
