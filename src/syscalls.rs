//! Syscall table for x86_64
//!
//! Maps syscall numbers to names, typed argument specs and return-value
//! semantics. Numbers missing from the table resolve to `syscall_NNN` with six
//! raw arguments.

use std::borrow::Cow;

use ArgType::{Bytes, Int, Long, ModeT, OffT, PidT, Ptr, SizeT, Str, StrArray, UInt, ULong};

/// Argument count used when the syscall is not in the table
pub const DEFAULT_ARG_COUNT: usize = 6;

/// How the decoder treats an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Plain number, no memory access
    Scalar,
    /// Pointer to a NUL-terminated string
    String,
    /// Pointer to a buffer whose length is another argument
    Buffer,
    /// Pointer to a NULL-terminated array of string pointers
    StringArray,
    /// Pointer that is shown but never dereferenced
    Opaque,
}

/// C-level type of a syscall parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    UInt,
    Long,
    ULong,
    SizeT,
    PidT,
    ModeT,
    OffT,
    /// `const char *`
    Str,
    /// `const void *` buffer being written by the caller; the length is in
    /// the argument at this index
    Bytes(usize),
    /// `const char *const *`
    StrArray,
    /// Any pointer we do not dereference, with its C type name
    Ptr(&'static str),
    /// Register value of a syscall missing from the table
    Raw,
}

impl ArgType {
    pub fn kind(self) -> ArgKind {
        match self {
            ArgType::Str => ArgKind::String,
            ArgType::Bytes(_) => ArgKind::Buffer,
            ArgType::StrArray => ArgKind::StringArray,
            ArgType::Ptr(_) => ArgKind::Opaque,
            _ => ArgKind::Scalar,
        }
    }

    /// C type name, `None` for raw registers
    pub fn c_name(self) -> Option<&'static str> {
        match self {
            ArgType::Int => Some("int"),
            ArgType::UInt => Some("unsigned int"),
            ArgType::Long => Some("long"),
            ArgType::ULong => Some("unsigned long"),
            ArgType::SizeT => Some("size_t"),
            ArgType::PidT => Some("pid_t"),
            ArgType::ModeT => Some("mode_t"),
            ArgType::OffT => Some("off_t"),
            ArgType::Str => Some("const char *"),
            ArgType::Bytes(_) => Some("const void *"),
            ArgType::StrArray => Some("const char *const *"),
            ArgType::Ptr(name) => Some(name),
            ArgType::Raw => None,
        }
    }

    /// Render a scalar register value honoring the C type's width and sign
    pub fn format_scalar(self, raw: u64) -> String {
        match self {
            ArgType::Int | ArgType::PidT => (raw as u32 as i32).to_string(),
            ArgType::UInt | ArgType::ModeT => (raw as u32).to_string(),
            ArgType::Long | ArgType::OffT => (raw as i64).to_string(),
            _ => raw.to_string(),
        }
    }
}

/// Named parameter of a syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
}

/// How the return register is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// Signed integer, `-4095..=-1` is an errno
    Int,
    /// Address, shown in hex unless it is an errno
    Addr,
    /// The call does not return to the caller
    NoReturn,
}

/// Static description of one syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallDef {
    pub number: i64,
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub ret: ReturnType,
}

/// Resolved identity of an observed syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallInfo {
    Known(&'static SyscallDef),
    Unknown(i64),
}

impl SyscallInfo {
    pub fn resolve(number: i64) -> Self {
        match lookup(number) {
            Some(def) => SyscallInfo::Known(def),
            None => SyscallInfo::Unknown(number),
        }
    }

    pub fn number(&self) -> i64 {
        match self {
            SyscallInfo::Known(def) => def.number,
            SyscallInfo::Unknown(number) => *number,
        }
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            SyscallInfo::Known(def) => Cow::Borrowed(def.name),
            SyscallInfo::Unknown(number) => Cow::Owned(format!("syscall_{}", number)),
        }
    }

    pub fn arg_count(&self) -> usize {
        match self {
            SyscallInfo::Known(def) => def.args.len(),
            SyscallInfo::Unknown(_) => DEFAULT_ARG_COUNT,
        }
    }

    /// Spec of argument `index`; unknown syscalls get raw, unnamed arguments
    pub fn arg_spec(&self, index: usize) -> Option<ArgSpec> {
        match self {
            SyscallInfo::Known(def) => def.args.get(index).copied(),
            SyscallInfo::Unknown(_) => None,
        }
    }

    pub fn return_type(&self) -> Option<ReturnType> {
        match self {
            SyscallInfo::Known(def) => Some(def.ret),
            SyscallInfo::Unknown(_) => None,
        }
    }
}

/// Resolve syscall number to name for x86_64
///
/// Returns the syscall name, or "syscall_NNN" if unknown
pub fn syscall_name(number: i64) -> Cow<'static, str> {
    SyscallInfo::resolve(number).name()
}

/// Look up a syscall by number
pub fn lookup(number: i64) -> Option<&'static SyscallDef> {
    SYSCALLS
        .binary_search_by_key(&number, |def| def.number)
        .ok()
        .map(|idx| &SYSCALLS[idx])
}

macro_rules! syscall {
    ($number:literal, $name:literal, $ret:ident $(, $arg:literal: $ty:expr)*) => {
        SyscallDef {
            number: $number,
            name: $name,
            args: &[$(ArgSpec { name: $arg, ty: $ty }),*],
            ret: ReturnType::$ret,
        }
    };
}

static SYSCALLS: &[SyscallDef] = &[
    syscall!(0, "read", Int, "fd": Int, "buf": Ptr("void *"), "count": SizeT),
    syscall!(1, "write", Int, "fd": Int, "buf": Bytes(2), "count": SizeT),
    syscall!(2, "open", Int, "filename": Str, "flags": Int, "mode": ModeT),
    syscall!(3, "close", Int, "fd": Int),
    syscall!(4, "stat", Int, "filename": Str, "statbuf": Ptr("struct stat *")),
    syscall!(5, "fstat", Int, "fd": Int, "statbuf": Ptr("struct stat *")),
    syscall!(6, "lstat", Int, "filename": Str, "statbuf": Ptr("struct stat *")),
    syscall!(7, "poll", Int, "ufds": Ptr("struct pollfd *"), "nfds": UInt, "timeout": Int),
    syscall!(8, "lseek", Int, "fd": Int, "offset": OffT, "whence": UInt),
    syscall!(9, "mmap", Addr, "addr": Ptr("void *"), "len": SizeT, "prot": Int, "flags": Int, "fd": Int, "off": OffT),
    syscall!(10, "mprotect", Int, "start": Ptr("void *"), "len": SizeT, "prot": Int),
    syscall!(11, "munmap", Int, "addr": Ptr("void *"), "len": SizeT),
    syscall!(12, "brk", Addr, "brk": Ptr("void *")),
    syscall!(13, "rt_sigaction", Int, "sig": Int, "act": Ptr("const struct sigaction *"), "oact": Ptr("struct sigaction *"), "sigsetsize": SizeT),
    syscall!(14, "rt_sigprocmask", Int, "how": Int, "nset": Ptr("sigset_t *"), "oset": Ptr("sigset_t *"), "sigsetsize": SizeT),
    syscall!(15, "rt_sigreturn", Int),
    syscall!(16, "ioctl", Int, "fd": Int, "cmd": UInt, "arg": ULong),
    syscall!(17, "pread64", Int, "fd": Int, "buf": Ptr("void *"), "count": SizeT, "pos": OffT),
    syscall!(18, "pwrite64", Int, "fd": Int, "buf": Bytes(2), "count": SizeT, "pos": OffT),
    syscall!(19, "readv", Int, "fd": Int, "vec": Ptr("const struct iovec *"), "vlen": ULong),
    syscall!(20, "writev", Int, "fd": Int, "vec": Ptr("const struct iovec *"), "vlen": ULong),
    syscall!(21, "access", Int, "filename": Str, "mode": Int),
    syscall!(22, "pipe", Int, "fildes": Ptr("int *")),
    syscall!(23, "select", Int, "n": Int, "inp": Ptr("fd_set *"), "outp": Ptr("fd_set *"), "exp": Ptr("fd_set *"), "tvp": Ptr("struct timeval *")),
    syscall!(24, "sched_yield", Int),
    syscall!(25, "mremap", Addr, "addr": Ptr("void *"), "old_len": SizeT, "new_len": SizeT, "flags": Int, "new_addr": Ptr("void *")),
    syscall!(26, "msync", Int, "start": Ptr("void *"), "len": SizeT, "flags": Int),
    syscall!(27, "mincore", Int, "start": Ptr("void *"), "len": SizeT, "vec": Ptr("unsigned char *")),
    syscall!(28, "madvise", Int, "start": Ptr("void *"), "len": SizeT, "behavior": Int),
    syscall!(29, "shmget", Int, "key": Int, "size": SizeT, "shmflg": Int),
    syscall!(30, "shmat", Addr, "shmid": Int, "shmaddr": Ptr("void *"), "shmflg": Int),
    syscall!(31, "shmctl", Int, "shmid": Int, "cmd": Int, "buf": Ptr("struct shmid_ds *")),
    syscall!(32, "dup", Int, "fildes": UInt),
    syscall!(33, "dup2", Int, "oldfd": UInt, "newfd": UInt),
    syscall!(34, "pause", Int),
    syscall!(35, "nanosleep", Int, "rqtp": Ptr("struct timespec *"), "rmtp": Ptr("struct timespec *")),
    syscall!(36, "getitimer", Int, "which": Int, "value": Ptr("struct itimerval *")),
    syscall!(37, "alarm", Int, "seconds": UInt),
    syscall!(38, "setitimer", Int, "which": Int, "value": Ptr("struct itimerval *"), "ovalue": Ptr("struct itimerval *")),
    syscall!(39, "getpid", Int),
    syscall!(40, "sendfile", Int, "out_fd": Int, "in_fd": Int, "offset": Ptr("off_t *"), "count": SizeT),
    syscall!(41, "socket", Int, "family": Int, "type": Int, "protocol": Int),
    syscall!(42, "connect", Int, "fd": Int, "uservaddr": Ptr("struct sockaddr *"), "addrlen": Int),
    syscall!(43, "accept", Int, "fd": Int, "upeer_sockaddr": Ptr("struct sockaddr *"), "upeer_addrlen": Ptr("int *")),
    syscall!(44, "sendto", Int, "fd": Int, "buff": Bytes(2), "len": SizeT, "flags": UInt, "addr": Ptr("struct sockaddr *"), "addr_len": Int),
    syscall!(45, "recvfrom", Int, "fd": Int, "ubuf": Ptr("void *"), "size": SizeT, "flags": UInt, "addr": Ptr("struct sockaddr *"), "addr_len": Ptr("int *")),
    syscall!(46, "sendmsg", Int, "fd": Int, "msg": Ptr("struct msghdr *"), "flags": UInt),
    syscall!(47, "recvmsg", Int, "fd": Int, "msg": Ptr("struct msghdr *"), "flags": UInt),
    syscall!(48, "shutdown", Int, "fd": Int, "how": Int),
    syscall!(49, "bind", Int, "fd": Int, "umyaddr": Ptr("struct sockaddr *"), "addrlen": Int),
    syscall!(50, "listen", Int, "fd": Int, "backlog": Int),
    syscall!(51, "getsockname", Int, "fd": Int, "usockaddr": Ptr("struct sockaddr *"), "usockaddr_len": Ptr("int *")),
    syscall!(52, "getpeername", Int, "fd": Int, "usockaddr": Ptr("struct sockaddr *"), "usockaddr_len": Ptr("int *")),
    syscall!(53, "socketpair", Int, "family": Int, "type": Int, "protocol": Int, "usockvec": Ptr("int *")),
    syscall!(54, "setsockopt", Int, "fd": Int, "level": Int, "optname": Int, "optval": Ptr("char *"), "optlen": Int),
    syscall!(55, "getsockopt", Int, "fd": Int, "level": Int, "optname": Int, "optval": Ptr("char *"), "optlen": Ptr("int *")),
    syscall!(56, "clone", Int, "clone_flags": ULong, "newsp": ULong, "parent_tidptr": Ptr("int *"), "child_tidptr": Ptr("int *"), "tls": ULong),
    syscall!(57, "fork", Int),
    syscall!(58, "vfork", Int),
    syscall!(59, "execve", Int, "filename": Str, "argv": StrArray, "envp": StrArray),
    syscall!(60, "exit", NoReturn, "error_code": Int),
    syscall!(61, "wait4", Int, "upid": PidT, "stat_addr": Ptr("int *"), "options": Int, "ru": Ptr("struct rusage *")),
    syscall!(62, "kill", Int, "pid": PidT, "sig": Int),
    syscall!(63, "uname", Int, "name": Ptr("struct new_utsname *")),
    syscall!(72, "fcntl", Int, "fd": UInt, "cmd": UInt, "arg": ULong),
    syscall!(73, "flock", Int, "fd": UInt, "cmd": UInt),
    syscall!(74, "fsync", Int, "fd": UInt),
    syscall!(75, "fdatasync", Int, "fd": UInt),
    syscall!(76, "truncate", Int, "path": Str, "length": Long),
    syscall!(77, "ftruncate", Int, "fd": UInt, "length": ULong),
    syscall!(78, "getdents", Int, "fd": UInt, "dirent": Ptr("struct linux_dirent *"), "count": UInt),
    syscall!(79, "getcwd", Int, "buf": Ptr("char *"), "size": ULong),
    syscall!(80, "chdir", Int, "filename": Str),
    syscall!(81, "fchdir", Int, "fd": UInt),
    syscall!(82, "rename", Int, "oldname": Str, "newname": Str),
    syscall!(83, "mkdir", Int, "pathname": Str, "mode": ModeT),
    syscall!(84, "rmdir", Int, "pathname": Str),
    syscall!(85, "creat", Int, "pathname": Str, "mode": ModeT),
    syscall!(86, "link", Int, "oldname": Str, "newname": Str),
    syscall!(87, "unlink", Int, "pathname": Str),
    syscall!(88, "symlink", Int, "oldname": Str, "newname": Str),
    syscall!(89, "readlink", Int, "path": Str, "buf": Ptr("char *"), "bufsiz": Int),
    syscall!(90, "chmod", Int, "filename": Str, "mode": ModeT),
    syscall!(91, "fchmod", Int, "fd": UInt, "mode": ModeT),
    syscall!(92, "chown", Int, "filename": Str, "user": UInt, "group": UInt),
    syscall!(93, "fchown", Int, "fd": UInt, "user": UInt, "group": UInt),
    syscall!(94, "lchown", Int, "filename": Str, "user": UInt, "group": UInt),
    syscall!(95, "umask", Int, "mask": Int),
    syscall!(96, "gettimeofday", Int, "tv": Ptr("struct timeval *"), "tz": Ptr("struct timezone *")),
    syscall!(97, "getrlimit", Int, "resource": UInt, "rlim": Ptr("struct rlimit *")),
    syscall!(98, "getrusage", Int, "who": Int, "ru": Ptr("struct rusage *")),
    syscall!(99, "sysinfo", Int, "info": Ptr("struct sysinfo *")),
    syscall!(102, "getuid", Int),
    syscall!(104, "getgid", Int),
    syscall!(105, "setuid", Int, "uid": UInt),
    syscall!(107, "setgid", Int, "gid": UInt),
    syscall!(108, "geteuid", Int),
    syscall!(109, "getegid", Int),
    syscall!(110, "setpgid", Int, "pid": PidT, "pgid": PidT),
    syscall!(111, "getppid", Int),
    syscall!(112, "getpgrp", Int),
    syscall!(113, "setsid", Int),
    syscall!(131, "sigaltstack", Int, "uss": Ptr("const stack_t *"), "uoss": Ptr("stack_t *")),
    syscall!(157, "prctl", Int, "option": Int, "arg2": ULong, "arg3": ULong, "arg4": ULong, "arg5": ULong),
    syscall!(158, "arch_prctl", Int, "option": Int, "addr": ULong),
    syscall!(186, "gettid", Int),
    syscall!(202, "futex", Int, "uaddr": Ptr("u32 *"), "op": Int, "val": UInt, "utime": Ptr("struct timespec *"), "uaddr2": Ptr("u32 *"), "val3": UInt),
    syscall!(217, "getdents64", Int, "fd": UInt, "dirent": Ptr("struct linux_dirent64 *"), "count": UInt),
    syscall!(218, "set_tid_address", Int, "tidptr": Ptr("int *")),
    syscall!(228, "clock_gettime", Int, "which_clock": Int, "tp": Ptr("struct timespec *")),
    syscall!(230, "clock_nanosleep", Int, "which_clock": Int, "flags": Int, "rqtp": Ptr("const struct timespec *"), "rmtp": Ptr("struct timespec *")),
    syscall!(231, "exit_group", NoReturn, "error_code": Int),
    syscall!(232, "epoll_wait", Int, "epfd": Int, "events": Ptr("struct epoll_event *"), "maxevents": Int, "timeout": Int),
    syscall!(233, "epoll_ctl", Int, "epfd": Int, "op": Int, "fd": Int, "event": Ptr("struct epoll_event *")),
    syscall!(257, "openat", Int, "dfd": Int, "filename": Str, "flags": Int, "mode": ModeT),
    syscall!(262, "newfstatat", Int, "dfd": Int, "filename": Str, "statbuf": Ptr("struct stat *"), "flag": Int),
    syscall!(263, "unlinkat", Int, "dfd": Int, "pathname": Str, "flag": Int),
    syscall!(267, "readlinkat", Int, "dfd": Int, "path": Str, "buf": Ptr("char *"), "bufsiz": Int),
    syscall!(273, "set_robust_list", Int, "head": Ptr("struct robust_list_head *"), "len": SizeT),
    syscall!(288, "accept4", Int, "fd": Int, "upeer_sockaddr": Ptr("struct sockaddr *"), "upeer_addrlen": Ptr("int *"), "flags": Int),
    syscall!(291, "epoll_create1", Int, "flags": Int),
    syscall!(293, "pipe2", Int, "fildes": Ptr("int *"), "flags": Int),
    syscall!(302, "prlimit64", Int, "pid": PidT, "resource": UInt, "new_rlim": Ptr("const struct rlimit64 *"), "old_rlim": Ptr("struct rlimit64 *")),
    syscall!(318, "getrandom", Int, "buf": Ptr("char *"), "count": SizeT, "flags": UInt),
    syscall!(322, "execveat", Int, "dfd": Int, "filename": Str, "argv": StrArray, "envp": StrArray, "flags": Int),
    syscall!(332, "statx", Int, "dfd": Int, "filename": Str, "flags": UInt, "mask": UInt, "buffer": Ptr("struct statx *")),
    syscall!(334, "rseq", Int, "rseq": Ptr("struct rseq *"), "rseq_len": UInt, "flags": Int, "sig": UInt),
    syscall!(435, "clone3", Int, "uargs": Ptr("struct clone_args *"), "size": SizeT),
    syscall!(439, "faccessat2", Int, "dfd": Int, "filename": Str, "mode": Int, "flags": Int),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_syscalls() {
        assert_eq!(syscall_name(0), "read");
        assert_eq!(syscall_name(1), "write");
        assert_eq!(syscall_name(2), "open");
        assert_eq!(syscall_name(3), "close");
        assert_eq!(syscall_name(257), "openat");
    }

    #[test]
    fn test_unknown_syscall() {
        assert_eq!(syscall_name(9999), "syscall_9999");
        let info = SyscallInfo::resolve(9999);
        assert_eq!(info.arg_count(), DEFAULT_ARG_COUNT);
        assert!(info.arg_spec(0).is_none());
        assert!(info.return_type().is_none());
    }

    #[test]
    fn test_table_sorted_and_unique() {
        for pair in SYSCALLS.windows(2) {
            assert!(
                pair[0].number < pair[1].number,
                "{} ({}) must precede {} ({})",
                pair[0].name,
                pair[0].number,
                pair[1].name,
                pair[1].number
            );
        }
    }

    #[test]
    fn test_no_syscall_exceeds_six_arguments() {
        assert!(SYSCALLS.iter().all(|def| def.args.len() <= DEFAULT_ARG_COUNT));
    }

    #[test]
    fn test_write_signature() {
        let def = lookup(1).unwrap();
        let kinds: Vec<ArgKind> = def.args.iter().map(|a| a.ty.kind()).collect();
        assert_eq!(kinds, vec![ArgKind::Scalar, ArgKind::Buffer, ArgKind::Scalar]);
        assert_eq!(def.args[1].ty, ArgType::Bytes(2));
        assert_eq!(def.args[0].name, "fd");
    }

    #[test]
    fn test_execve_takes_string_arrays() {
        let def = lookup(59).unwrap();
        assert_eq!(def.name, "execve");
        assert_eq!(def.args[1].ty.kind(), ArgKind::StringArray);
    }

    #[test]
    fn test_buffer_lengths_point_at_size_arguments() {
        for def in SYSCALLS {
            for arg in def.args {
                if let ArgType::Bytes(len) = arg.ty {
                    let sized = def.args.get(len).map(|a| a.ty);
                    assert!(
                        matches!(sized, Some(ArgType::SizeT)),
                        "{}: length of {} must be a size_t argument",
                        def.name,
                        arg.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_exit_never_returns() {
        assert_eq!(lookup(60).unwrap().ret, ReturnType::NoReturn);
        assert_eq!(lookup(231).unwrap().ret, ReturnType::NoReturn);
        assert_eq!(lookup(9).unwrap().ret, ReturnType::Addr);
    }

    #[test]
    fn test_scalar_formatting_respects_width() {
        assert_eq!(ArgType::Int.format_scalar(0xffff_ffff), "-1");
        assert_eq!(ArgType::Int.format_scalar(0xffff_ff9c), "-100");
        assert_eq!(ArgType::UInt.format_scalar(0x1_0000_0005), "5");
        assert_eq!(ArgType::SizeT.format_scalar(2), "2");
        assert_eq!(ArgType::Long.format_scalar(u64::MAX), "-1");
    }
}
