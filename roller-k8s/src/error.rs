use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to list nodes labeled '{}': {}", label_key, source))]
    ListNodes {
        label_key: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to patch node '{}': {}", node_name, source))]
    PatchNode {
        node_name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "Unable to scale deployment '{}/{}' to {} replicas: {}",
        namespace,
        name,
        replicas,
        source
    ))]
    ScaleDeployment {
        namespace: String,
        name: String,
        replicas: i32,
        source: kube::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
