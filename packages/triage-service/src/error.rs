pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("No analysis snapshot has been built yet.")]
	NotReady,
	#[error("Tile store error: {message}")]
	TileStore { message: String },
	#[error("Expectations store error: {message}")]
	Expectations { message: String },
	#[error("Ignore store error: {message}")]
	IgnoreStore { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Timed out waiting for {operation}.")]
	Timeout { operation: String },
}
impl From<triage_storage::Error> for Error {
	fn from(err: triage_storage::Error) -> Self {
		match err {
			triage_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
