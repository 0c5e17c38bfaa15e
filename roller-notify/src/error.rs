use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to send webhook notification: {}", source))]
    Send { source: reqwest::Error },

    #[snafu(display("Webhook returned status {}: {}", status, body))]
    BadResponse { status: reqwest::StatusCode, body: String },
}

pub type Result<T> = std::result::Result<T, Error>;
