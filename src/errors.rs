/*
Copyright 2025 The SN/X Project Developers

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

/// Hard failures raised by the encoder. These indicate a broken caller
/// invariant (the IR was not validated), not a user-facing diagnostic.
#[derive(Error, Debug, PartialEq)]
pub enum EncodingError {
    #[error("invalid operands for {kind} instruction: {text}")]
    InvalidOperands { kind: &'static str, text: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum SimulatorError {
    #[error("cannot simulate: compilation produced no IR")]
    MissingIr,
}
