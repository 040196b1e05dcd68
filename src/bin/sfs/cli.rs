use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shell and FUSE front end for simplefs disk images
#[derive(Parser)]
#[command(version)]
pub struct Cli {
    /// Disk image, created if it does not exist
    pub image: PathBuf,

    /// Size of the image in blocks
    pub nblocks: usize,

    /// Run a single command instead of the shell
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// One line typed at the shell prompt.
#[derive(Parser)]
#[command(no_binary_name = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write an empty file system over the image
    Format,
    /// Check the superblock and scan the inode table
    Mount,
    Unmount,
    /// Dump the superblock and every valid inode
    Debug,
    /// Allocate an empty inode
    Create,
    /// Free an inode and its blocks
    Delete { inumber: usize },
    /// Print the size of an inode
    Getsize { inumber: usize },
    /// Print the contents of an inode
    Cat { inumber: usize },
    /// Copy a host file into an inode
    Copyin { file: PathBuf, inumber: usize },
    /// Copy an inode out to a host file
    Copyout { inumber: usize, file: PathBuf },
    /// Serve the volume over FUSE until it is unmounted
    Fuse { mountpoint: PathBuf },
    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

impl Command {
    /// Whether a one-shot run has to mount the volume first.
    pub fn needs_mount(&self) -> bool {
        !matches!(self, Command::Format | Command::Debug | Command::Quit)
    }
}
