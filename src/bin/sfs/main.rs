mod cli;

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, Line};
use simplefs_fuse::{DiskImage, FileSystem, SimpleFuse};

/// copyin / copyout / cat transfer size
const CHUNK_SIZE: usize = 16 * 1024;

const PROMPT: &str = "simplefs> ";

enum Flow {
    Continue,
    Quit,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let disk = match DiskImage::open(&cli.image, cli.nblocks) {
        Ok(disk) => Arc::new(disk),
        Err(err) => {
            eprintln!("cannot open {}: {err}", cli.image.display());
            return ExitCode::FAILURE;
        }
    };
    let mut fs = FileSystem::new(disk.clone());

    let code = match cli.command {
        Some(command) => one_shot(&mut fs, command),
        None => shell(&mut fs),
    };

    println!("{} disk block reads", disk.reads());
    println!("{} disk block writes", disk.writes());
    code
}

fn one_shot(fs: &mut FileSystem, command: Command) -> ExitCode {
    let result: Result<Flow, Box<dyn Error>> = if command.needs_mount() {
        fs.mount().map_err(Into::into).and_then(|()| run(fs, command))
    } else {
        run(fs, command)
    };
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn shell(fs: &mut FileSystem) -> ExitCode {
    let mut lines = io::stdin().lock().lines();
    loop {
        print!("{PROMPT}");
        if io::stdout().flush().is_err() {
            return ExitCode::FAILURE;
        }

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
            None => {
                println!();
                return ExitCode::SUCCESS;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        // `help` and malformed lines come back as clap errors carrying the text to show
        let command = match Line::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed.command,
            Err(err) => {
                print!("{err}");
                continue;
            }
        };
        match run(fs, command) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return ExitCode::SUCCESS,
            Err(err) => println!("error: {err}"),
        }
    }
}

fn run(fs: &mut FileSystem, command: Command) -> Result<Flow, Box<dyn Error>> {
    match command {
        Command::Format => {
            fs.format()?;
            println!("disk formatted.");
        }
        Command::Mount => {
            fs.mount()?;
            println!("disk mounted.");
        }
        Command::Unmount => {
            fs.unmount();
            println!("disk unmounted.");
        }
        Command::Debug => print!("{}", fs.debug()?),
        Command::Create => println!("created inode {}.", fs.create()?),
        Command::Delete { inumber } => {
            fs.delete(inumber)?;
            println!("removed inode {inumber}.");
        }
        Command::Getsize { inumber } => {
            println!("inode {inumber} has size {}.", fs.getsize(inumber)?);
        }
        Command::Cat { inumber } => {
            copyout(fs, inumber, &mut io::stdout().lock())?;
        }
        Command::Copyin { file, inumber } => {
            let copied = copyin(fs, &file, inumber)?;
            println!("{copied} bytes copied");
        }
        Command::Copyout { inumber, file } => {
            let copied = copyout(fs, inumber, &mut File::create(&file)?)?;
            println!("{copied} bytes copied");
        }
        Command::Fuse { mountpoint } => serve(fs, &mountpoint)?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Copies `path` into `inumber` from offset 0 and returns the number of bytes stored.
fn copyin(fs: &mut FileSystem, path: &Path, inumber: usize) -> Result<usize, Box<dyn Error>> {
    let mut file = File::open(path)?;
    let mut buf = vec![0; CHUNK_SIZE];
    let mut offset = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let written = fs.write(inumber, &buf[..n], offset)?;
        offset += written;
        if written < n {
            log::warn!("copyin: volume full after {offset} bytes");
            break;
        }
    }
    Ok(offset)
}

fn copyout(fs: &FileSystem, inumber: usize, out: &mut impl Write) -> Result<usize, Box<dyn Error>> {
    let mut buf = vec![0; CHUNK_SIZE];
    let mut offset = 0;
    loop {
        let n = fs.read(inumber, &mut buf, offset)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n;
    }
    out.flush()?;
    Ok(offset)
}

/// Hands the mounted volume to FUSE and takes it back once the mount point is released.
fn serve(fs: &mut FileSystem, mountpoint: &Path) -> Result<(), Box<dyn Error>> {
    if !fs.is_mounted() {
        fs.mount()?;
    }
    let idle = FileSystem::new(fs.blk_dev());
    let served = std::mem::replace(fs, idle);
    SimpleFuse::new(served).mount(mountpoint)?;
    fs.mount()?;
    Ok(())
}
