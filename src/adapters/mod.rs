// Adapters layer: concrete implementations of the domain ports for minio (S3),
// colab (SSH/SFTP) and local tooling (sshfs, aws CLI).

pub mod process;
pub mod remote;
pub mod storage;
pub mod sync;
