// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pull-based result readers.
//!
//! Every stage of result fetching implements [`ResultsProvider`]: the
//! upstream source yields pages of links, and the CloudFetch handler turns
//! them into downloaded batches.

pub mod cloudfetch;

use crate::error::Result;
use async_trait::async_trait;

/// Default row limit hint passed to upstream sources.
pub const DEFAULT_FETCH_LIMIT: usize = 100_000;

/// Options passed through each pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchNextOptions {
    /// Row limit hint for the upstream source.
    pub limit: usize,
}

impl Default for FetchNextOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

/// A pull-based source of `T`.
///
/// `fetch_next` takes `&mut self`, so a provider is driven by exactly one
/// caller at a time.
#[async_trait]
pub trait ResultsProvider<T>: Send + Sync {
    /// Whether another `fetch_next` may yield data. Has no side effects.
    async fn has_more(&self) -> Result<bool>;

    /// Pull the next item.
    async fn fetch_next(&mut self, options: &FetchNextOptions) -> Result<T>;
}
