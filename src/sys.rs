//! Safe wrappers for the few platform calls that need `unsafe`.
//!
//! Call sites use these functions and never touch `libc` or the process
//! environment directly.

/// Effective user ID of the host process, used to name the fallback socket.
pub fn current_uid() -> u32 {
    // SAFETY: getuid is a read-only POSIX syscall with no preconditions.
    unsafe { libc::getuid() }
}

/// Run a closure with stderr temporarily redirected to `/dev/null`.
///
/// CPAL prints ALSA/JACK probing noise on fd 2 while enumerating backends.
/// Only safe while no other thread is manipulating fd 2.
pub fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: fd 2 is saved and restored around the closure; the caller
    // guarantees no concurrent fd 2 manipulation.
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Set an environment variable. Call before spawning threads.
pub fn set_env(key: &str, value: &str) {
    // SAFETY: callers only use this at startup or under a test lock.
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Remove an environment variable. Call before spawning threads.
pub fn remove_env(key: &str) {
    // SAFETY: callers only use this at startup or under a test lock.
    unsafe {
        std::env::remove_var(key);
    }
}

/// Quiet the JACK/ALSA/PipeWire chatter that device probing produces.
pub fn suppress_audio_warnings() {
    set_env("JACK_NO_START_SERVER", "1");
    set_env("JACK_NO_AUDIO_RESERVATION", "1");
    set_env("PIPEWIRE_DEBUG", "0");
    set_env("ALSA_DEBUG", "0");
    set_env("PW_LOG", "0");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn current_uid_matches_libc() {
        // SAFETY: see current_uid.
        let expected = unsafe { libc::getuid() };
        assert_eq!(current_uid(), expected);
    }

    #[test]
    fn with_suppressed_stderr_returns_value() {
        let result = with_suppressed_stderr(|| 42_u32);
        assert_eq!(result, 42);
    }

    #[test]
    fn set_env_and_read_back() {
        let _guard = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
        const KEY: &str = "VOXDESK_SYS_TEST_VAR";
        set_env(KEY, "hello");
        assert_eq!(std::env::var(KEY).expect("var should be set"), "hello");
        remove_env(KEY);
        assert!(std::env::var(KEY).is_err());
    }
}
