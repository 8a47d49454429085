//! Dev server management - spawning, output capture and teardown

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{SmokeError, SmokeResult};

/// Recent stdout/stderr lines of the child, merged in arrival order
#[derive(Debug, Clone)]
pub struct OutputLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if self.capacity == 0 {
            return;
        }
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the buffered lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

/// Handle to the running dev server process
pub struct DevServer {
    child: Child,
    /// Process group id, fixed at spawn; the child's pid is gone once reaped
    group: Option<u32>,
    output: OutputLog,
    readers: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl DevServer {
    /// Spawn the dev server described by `config`
    pub fn spawn(config: &ServerConfig) -> SmokeResult<Self> {
        let args = config.resolved_args();
        info!(
            "Spawning dev server: {} {} (port {})",
            config.program,
            args.join(" "),
            config.port
        );

        let mut cmd = Command::new(&config.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group, so teardown reaches whatever the runner spawns
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            SmokeError::ServerStartup(format!("Failed to spawn {}: {}", config.program, e))
        })?;

        let output = OutputLog::new(config.output_lines);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(capture(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(capture(stderr, output.clone()));
        }

        let group = child.id();

        Ok(Self {
            child,
            group,
            output,
            readers,
            stopped: false,
        })
    }

    /// OS process id, None once the child has been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    /// Terminate the server: SIGTERM, wait up to `grace`, then SIGKILL
    pub async fn shutdown(&mut self, grace: Duration) -> SmokeResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        if let Some(status) = self.child.try_wait()? {
            info!("Dev server already exited ({})", status);
            self.kill_group();
            self.finish_readers().await;
            return Ok(());
        }

        info!("Stopping dev server (pid: {:?})", self.child.id());
        self.signal(Terminate::Graceful);

        match timeout(grace, self.child.wait()).await {
            Ok(status) => {
                debug!("Dev server exited: {:?}", status);
            }
            Err(_) => {
                warn!("Dev server ignored SIGTERM for {:?}, killing", grace);
                self.signal(Terminate::Forced);
                let _ = self.child.start_kill();
                self.child.wait().await?;
            }
        }

        self.kill_group();
        self.finish_readers().await;
        Ok(())
    }

    #[cfg(unix)]
    fn signal(&self, how: Terminate) {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let Some(id) = self.child.id() else {
            return;
        };
        let pid = Pid::from_raw(id as i32);
        let signal = match how {
            Terminate::Graceful => Signal::SIGTERM,
            Terminate::Forced => Signal::SIGKILL,
        };

        if killpg(pid, signal).is_err() {
            let _ = kill(pid, signal);
        }
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _how: Terminate) {
        let _ = self.child.start_kill();
    }

    /// SIGKILL whatever is left in the group after the leader was reaped
    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(group) = self.group else {
            return;
        };
        match killpg(Pid::from_raw(group as i32), Signal::SIGKILL) {
            Ok(()) => debug!("Killed leftover processes in group {}", group),
            Err(Errno::ESRCH) => {}
            Err(e) => debug!("killpg({}) failed: {}", group, e),
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}

    async fn finish_readers(&mut self) {
        for reader in self.readers.drain(..) {
            // Grandchildren can hold the pipes open; don't wait on them forever
            if timeout(Duration::from_millis(500), reader).await.is_err() {
                debug!("Output reader still attached after shutdown");
            }
        }
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        if !self.stopped {
            self.signal(Terminate::Forced);
            let _ = self.child.start_kill();
        }
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Terminate {
    Graceful,
    Forced,
}

fn capture<R>(stream: R, output: OutputLog) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "dev_server", "{}", line);
            output.push(line);
        }
    })
}
