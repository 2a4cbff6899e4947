/*!
 * System Limits and Constants
 *
 * Centralized location for the tuning constants used by the waiter core.
 *
 * ## Conventions
 * - Performance-critical constants are marked with [PERF]
 * - Values that change observable behavior are marked with [SEMANTICS]
 */

// =============================================================================
// SPIN / BACKOFF
// =============================================================================

/// Tight-spin iterations before a waiting thread starts yielding (10)
/// [PERF] Covers the common case where the completing thread is mid-publish
pub const TIGHT_SPIN_ITERATIONS: u32 = 10;

/// Default spin budget before sleeping with backoff (64 iterations)
/// Used when a dropped handle must wait for an in-flight completion
pub const DEFAULT_SPIN_LIMIT: u32 = 64;

/// Maximum backoff sleep once the spin budget is exhausted (1ms)
/// [PERF] Prevents excessive spinning on long completion chains
pub const MAX_BACKOFF_NANOS: u64 = 1_000_000;

// =============================================================================
// WAITER POOL
// =============================================================================

/// Default idle waiters a pool keeps (unbounded)
/// [SEMANTICS] `None` keeps every recycled waiter; set a cap through
/// `SyncConfig::with_pool_retain` to bound idle memory
pub const DEFAULT_POOL_RETAIN: Option<usize> = None;

/// Pool growth logging interval (every 64 fresh waiters)
/// Keeps the debug log readable under bursty contention
pub const POOL_GROWTH_LOG_INTERVAL: u64 = 64;
