use crate::{config::SourceKind, error::TraceError, report::OriginId, source::SourceDescriptor};

use super::OriginResolver;

impl OriginResolver<'_> {
	/// Origin of a remote source, built from its descriptor as
	/// `<kind>[+<protocol>]://<host><path>[@<revision>]`.
	///
	/// `known` is used when it describes `src_uri`, otherwise the fetcher is
	/// asked for a descriptor. An explicit `revision` wins over the one the
	/// descriptor pins. The entry records `recorded_uri` as its source uri, or
	/// `src_uri` when not given.
	pub fn resolve_remote(
		&mut self,
		src_uri: &str,
		known: Option<&dyn SourceDescriptor>,
		revision: Option<&str>,
		recorded_uri: Option<&str>,
	) -> Result<OriginId, TraceError> {
		let fetcher = self.fetcher;

		let fetched;
		let descriptor: &dyn SourceDescriptor = match known {
			Some(descriptor) if descriptor.url() == src_uri => descriptor,
			_ => {
				fetched = fetcher.descriptor(src_uri, revision)?;
				fetched.as_ref()
			}
		};

		// Registry uris are not a public identity, the url they download from is
		let normalized = if self.config.classify(descriptor.kind()) == SourceKind::Registry {
			let fetch_url = descriptor.fetch_url().ok_or_else(|| TraceError::Fetcher {
				uri: descriptor.url().to_string(),
				reason: "registry source without a download url".to_string(),
			})?;
			Some(fetcher.descriptor(fetch_url, None)?)
		} else {
			None
		};
		let located: &dyn SourceDescriptor = match &normalized {
			Some(normalized) => normalized.as_ref(),
			None => descriptor,
		};

		let download_location = self.download_location(located, revision);

		// Checksums stay with the registry descriptor, the one they were declared on
		Ok(self.intern(
			download_location,
			recorded_uri.unwrap_or(src_uri),
			Some(descriptor),
			None,
		))
	}

	fn download_location(&self, descriptor: &dyn SourceDescriptor, revision: Option<&str>) -> String {
		let mut download_location = self.config.location_kind(descriptor.kind()).to_string();

		if let Some(protocol) = descriptor.protocol() {
			download_location.push('+');
			download_location.push_str(protocol);
		}

		download_location.push_str("://");
		download_location.push_str(descriptor.host());
		download_location.push_str(descriptor.path());

		let revision = revision.or_else(|| {
			descriptor
				.supports_srcrev()
				.then(|| descriptor.pinned_revision())
				.flatten()
		});

		if let Some(revision) = revision {
			download_location.push('@');
			download_location.push_str(revision);
		}

		download_location
	}
}
