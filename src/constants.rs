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

/// Number of general-purpose registers in the default machine configuration.
pub const DEFAULT_REG_COUNT: usize = 4;

/// Number of 16-bit memory words in the default machine configuration.
pub const DEFAULT_MEM_SIZE: usize = 128;

/// Register conventionally used as the stack pointer.
pub const STACK_POINTER_REG: usize = 3;

/// Slot-key base for addresses formed off register 0 (the static segment).
pub const STATIC_SEGMENT_BASE: i32 = 1000;

/// Dataflow safety clamp: maximum number of worklist visits per PC.
pub const MAX_VISITS_PER_PC: usize = 20;

/// Dataflow safety clamp: worklist pops allowed per instruction in the program.
pub const ITERATION_BUDGET_FACTOR: usize = 10;

/// Normalized name of the entry label.
pub const ENTRY_LABEL: &str = "MAIN";

/// Default number of words per line in the hex dump format.
pub const HEX_WORDS_PER_LINE: usize = 8;
