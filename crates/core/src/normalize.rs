//! Resolution of route overrides into their dispatched form.
//!
//! [`Route`](crate::Route) hands caller options to a [`Normalizer`] and
//! forwards whatever comes back. [`DefaultNormalizer`] reads fulfillment
//! files, fills in content type and length, and lower-cases header names.
//! A continue that replaces only the post data resends the intercepted
//! request's headers with a `content-length` matching the new body.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use pw_net_protocol::{
	ContinueOptions, DEFAULT_FULFILL_STATUS, FulfillOptions, HeaderEntry, NormalizedContinue, NormalizedFulfill,
};
use pw_net_runtime::{Error, Result};

use crate::headers::Headers;

/// Boxed normalizer future.
pub type NormalizeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Resolves route action options before dispatch.
pub trait Normalizer: Send + Sync {
	/// `request_headers` are the intercepted request's current headers.
	fn normalize_continue(&self, options: ContinueOptions, request_headers: Headers) -> NormalizeFuture<'_, NormalizedContinue>;

	fn normalize_fulfill(&self, options: FulfillOptions) -> NormalizeFuture<'_, NormalizedFulfill>;
}

/// Normalizer used unless [`ProxyOptions`](crate::ProxyOptions) names another.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl Normalizer for DefaultNormalizer {
	fn normalize_continue(&self, options: ContinueOptions, request_headers: Headers) -> NormalizeFuture<'_, NormalizedContinue> {
		Box::pin(async move { Ok(normalize_continue(options, request_headers)) })
	}

	fn normalize_fulfill(&self, options: FulfillOptions) -> NormalizeFuture<'_, NormalizedFulfill> {
		Box::pin(async move {
			if options.path.is_some() && options.body.is_some() {
				return Err(Error::InvalidArgument("fulfill accepts either a body or a path, not both".to_string()));
			}

			let body = match (&options.path, options.body) {
				(Some(path), _) => tokio::fs::read(path).await?,
				(None, Some(body)) => body.into_bytes(),
				(None, None) => Vec::new(),
			};

			let mut headers = lowercase(options.headers.unwrap_or_default());
			if let Some(content_type) = options.content_type {
				headers.insert("content-type".to_string(), content_type);
			} else if let Some(path) = &options.path {
				headers
					.entry("content-type".to_string())
					.or_insert_with(|| mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string());
			}
			headers.entry("content-length".to_string()).or_insert_with(|| body.len().to_string());

			Ok(NormalizedFulfill {
				status: options.status.unwrap_or(DEFAULT_FULFILL_STATUS),
				headers: into_entries(headers),
				body,
			})
		})
	}
}

fn normalize_continue(options: ContinueOptions, request_headers: Headers) -> NormalizedContinue {
	let headers = match (options.headers, &options.post_data) {
		(Some(headers), _) => Some(lowercase(headers)),
		(None, Some(_)) => Some(request_headers.into_iter().collect()),
		(None, None) => None,
	};
	let headers = headers.map(|mut headers| {
		if let Some(post_data) = &options.post_data {
			headers.insert("content-length".to_string(), post_data.len().to_string());
		}
		into_entries(headers)
	});

	NormalizedContinue {
		method: options.method,
		headers,
		post_data: options.post_data,
	}
}

fn lowercase(headers: HashMap<String, String>) -> HashMap<String, String> {
	headers.into_iter().map(|(name, value)| (name.to_ascii_lowercase(), value)).collect()
}

/// Header entries sorted by name so dispatched payloads are deterministic.
fn into_entries(headers: HashMap<String, String>) -> Vec<HeaderEntry> {
	let mut entries: Vec<_> = headers.into_iter().map(|(name, value)| HeaderEntry { name, value }).collect();
	entries.sort_by(|a, b| a.name.cmp(&b.name));
	entries
}
