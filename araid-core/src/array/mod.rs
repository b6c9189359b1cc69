// vim: tw=80
//! Aggregation of component disks into one logical block device
//!
//! An [`Array`] combines several [`ComponentDev`]s into a single flat LBA
//! space, either by concatenation or by striping.  It owns the address
//! arithmetic, the bounded request pool, and the completion bookkeeping, but
//! performs no I/O itself.

use std::{
    num::NonZeroU64,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::{channel::oneshot, Future};
use pin_project::pin_project;
use tracing::{instrument, warn};

use crate::component::ComponentDev;
use crate::types::*;
use crate::util::*;

mod layout;
mod pool;

use layout::Planner;
pub use pool::{ComponentRequest, RequestPool};

/// How an array's logical LBA space maps onto its components.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    /// Concatenation.  Components are filled in order.
    Span,
    /// Striping with no redundancy.  `width` must equal the component count.
    Stripe0 {
        width: usize,
        interleave: NonZeroU64,
    },
    /// Mirroring.  Recognized but not yet implemented.
    Mirror,
    /// Striping over mirrors.  Recognized but not yet implemented.
    Stripe0Mirror,
}

/// Future returned by [`Array::read_at`] and [`Array::write_at`].
///
/// Resolves exactly once, after every component fragment of the request has
/// completed.
#[pin_project]
pub struct IoFut {
    #[pin]
    receiver: oneshot::Receiver<Result<()>>,
}

impl Future for IoFut {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output>
    {
        self.project().receiver.poll(cx).map(|r| match r {
            Ok(r) => r,
            Err(_) => Err(Error::EPIPE),
        })
    }
}

/// Shared completion state for one logical request.
struct LogicalReq {
    pool: Arc<RequestPool>,
    state: Mutex<LogicalState>,
}

struct LogicalState {
    /// Fragments not yet completed
    residual: usize,
    /// First component error observed, in completion order
    error: Option<Error>,
    /// Taken when the logical request completes
    tx: Option<oneshot::Sender<Result<()>>>,
}

impl LogicalReq {
    fn new(pool: Arc<RequestPool>, residual: usize,
           tx: oneshot::Sender<Result<()>>) -> Self
    {
        debug_assert!(residual > 0);
        LogicalReq {
            pool,
            state: Mutex::new(LogicalState {
                residual,
                error: None,
                tx: Some(tx),
            }),
        }
    }

    /// Record the completion of one fragment, releasing its record to the
    /// pool.  When the last fragment completes, the logical request does too.
    fn fragment_done(&self, req: ComponentRequest, r: Result<()>) {
        self.pool.release(req);
        let mut state = self.state.lock().unwrap();
        if let Err(e) = r {
            if state.error.is_none() {
                state.error = Some(e);
            }
        }
        state.residual -= 1;
        if state.residual == 0 {
            let result = state.error.map_or(Ok(()), Err);
            if let Some(tx) = state.tx.take() {
                // The caller may have dropped the receiver already
                let _ = tx.send(result);
            }
        }
    }
}

/// A group of component disks aggregated into one logical device.
pub struct Array {
    components: Box<[Arc<dyn ComponentDev>]>,
    planner: Planner,
    /// Size of the logical LBA space, in sectors
    capacity: LbaT,
    /// Added to every physical address, reserving the front of each
    /// component for metadata.
    base_offset: LbaT,
    pool: Arc<RequestPool>,
}

impl Array {
    /// Activate an array from its already-opened components.
    ///
    /// `components` pairs each member's declared capacity, in sectors, with
    /// its device handle, in component order.  The declared capacities and
    /// the layout must describe a geometry that actually fits on the
    /// devices, or activation fails with `EINVAL`.
    pub fn create(layout: Layout,
                  components: Vec<(LbaT, Arc<dyn ComponentDev>)>,
                  capacity: LbaT,
                  base_offset: LbaT,
                  pool: Arc<RequestPool>) -> Result<Self>
    {
        if components.is_empty() || capacity == 0 {
            return Err(Error::EINVAL);
        }
        for (cap, dev) in &components {
            let end = base_offset.checked_add(*cap).ok_or(Error::EINVAL)?;
            if *cap == 0 || end > dev.size() {
                return Err(Error::EINVAL);
            }
        }
        let planner = match layout {
            Layout::Span => {
                let caps = components.iter()
                    .map(|(cap, _)| *cap)
                    .collect::<Vec<_>>();
                let sum = caps.iter()
                    .try_fold(0 as LbaT, |acc, cap| acc.checked_add(*cap))
                    .ok_or(Error::EINVAL)?;
                if capacity > sum {
                    return Err(Error::EINVAL);
                }
                Planner::Span { caps: caps.into_boxed_slice() }
            }
            Layout::Stripe0 { width, interleave } => {
                if width != components.len() {
                    return Err(Error::EINVAL);
                }
                let width = width as LbaT;
                let il = interleave.get();
                let units = capacity / il;
                let tail = capacity % il;
                // A trailing short stripe is only well-defined when the
                // whole units fill complete rows and the tail divides
                // evenly.  Anything else would make components collide.
                if tail != 0 && (units % width != 0 || tail % width != 0) {
                    return Err(Error::EINVAL);
                }
                for (c, (cap, _)) in components.iter().enumerate() {
                    let c = c as LbaT;
                    let used = if tail != 0 {
                        (units / width) * il + tail / width
                    } else if units > c {
                        div_roundup(units - c, width) * il
                    } else {
                        0
                    };
                    if used > *cap {
                        return Err(Error::EINVAL);
                    }
                }
                Planner::Stripe0 { width, interleave: il }
            }
            Layout::Mirror | Layout::Stripe0Mirror => {
                return Err(Error::EINVAL);
            }
        };
        let components = components.into_iter()
            .map(|(_, dev)| dev)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Array {
            components,
            planner,
            capacity,
            base_offset,
            pool,
        })
    }

    /// Size of the logical LBA space, in sectors.
    pub fn size(&self) -> LbaT {
        self.capacity
    }

    /// Plan a request and reserve one pool record per fragment.
    ///
    /// All-or-nothing: if the pool runs dry partway through, every record
    /// already taken is returned and the whole request fails, with nothing
    /// submitted to any component.
    fn prepare(&self, start: LbaT, len: usize) -> Result<Vec<ComponentRequest>>
    {
        let frags = self.planner.plan(self.capacity, self.base_offset, start,
                                      len)?;
        let mut reqs = Vec::with_capacity(frags.len());
        for frag in &frags {
            match self.pool.acquire() {
                Ok(mut req) => {
                    req.target = frag.target;
                    req.lba = frag.lba;
                    req.len = frag.len;
                    req.buf_offset = frag.buf_offset;
                    reqs.push(req);
                }
                Err(e) => {
                    warn!(needed = frags.len(), got = reqs.len(),
                          "request pool exhausted");
                    for req in reqs {
                        self.pool.release(req);
                    }
                    return Err(e);
                }
            }
        }
        Ok(reqs)
    }

    /// Asynchronously read a contiguous logical range into `buf`.
    ///
    /// `buf` must be a nonzero whole number of sectors.  Address and
    /// resource errors are reported synchronously; component I/O errors
    /// resolve through the returned future, first error wins.
    #[instrument(skip(self, buf), fields(len = buf.len()))]
    pub fn read_at(&self, mut buf: IoVecMut, lba: LbaT) -> Result<IoFut> {
        let reqs = self.prepare(lba, buf.len())?;
        let (tx, rx) = oneshot::channel();
        let lreq = Arc::new(LogicalReq::new(self.pool.clone(), reqs.len(),
                                            tx));
        let mut consumed = 0;
        for req in reqs {
            debug_assert_eq!(req.buf_offset, consumed);
            consumed += req.len;
            let fbuf = buf.split_to(req.len);
            let fut = self.components[req.target].read_at(fbuf, req.lba);
            let lreq2 = lreq.clone();
            tokio::spawn(async move {
                let r = fut.await;
                lreq2.fragment_done(req, r);
            });
        }
        debug_assert!(buf.is_empty());
        Ok(IoFut { receiver: rx })
    }

    /// Asynchronously write the contents of `buf` to a contiguous logical
    /// range.
    ///
    /// Same contract as [`Array::read_at`].
    #[instrument(skip(self, buf), fields(len = buf.len()))]
    pub fn write_at(&self, mut buf: IoVec, lba: LbaT) -> Result<IoFut> {
        let reqs = self.prepare(lba, buf.len())?;
        let (tx, rx) = oneshot::channel();
        let lreq = Arc::new(LogicalReq::new(self.pool.clone(), reqs.len(),
                                            tx));
        let mut consumed = 0;
        for req in reqs {
            debug_assert_eq!(req.buf_offset, consumed);
            consumed += req.len;
            let fbuf = buf.split_to(req.len);
            let fut = self.components[req.target].write_at(fbuf, req.lba);
            let lreq2 = lreq.clone();
            tokio::spawn(async move {
                let r = fut.await;
                lreq2.fragment_done(req, r);
            });
        }
        debug_assert!(buf.is_empty());
        Ok(IoFut { receiver: rx })
    }
}

// LCOV_EXCL_STOP
