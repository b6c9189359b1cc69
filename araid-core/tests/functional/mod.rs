// vim: tw=80
//! End to end tests with RAM-backed components

use std::sync::{Arc, Mutex};

use divbuf::DivBufShared;
use futures::future;
use nonzero_ext::nonzero;
use pretty_assertions::assert_eq;
use rand::{RngCore, SeedableRng};
use rand_xorshift::XorShiftRng;

use araid_core::{
    array::{Array, Layout, RequestPool},
    component::{BoxCompFut, ComponentDev},
    Error, IoVec, IoVecMut, LbaT,
    bytes_to_sectors, sectors_to_bytes,
};

/// An in-memory component device
struct RamDev {
    data: Mutex<Vec<u8>>,
}

impl RamDev {
    fn new(sectors: LbaT) -> Self {
        RamDev {
            data: Mutex::new(vec![0u8; sectors_to_bytes(sectors)]),
        }
    }

    fn sector(&self, lba: LbaT) -> Vec<u8> {
        let start = sectors_to_bytes(lba);
        self.data.lock().unwrap()[start..start + 512].to_vec()
    }
}

impl ComponentDev for RamDev {
    fn size(&self) -> LbaT {
        bytes_to_sectors(self.data.lock().unwrap().len())
    }

    fn read_at(&self, mut buf: IoVecMut, lba: LbaT) -> BoxCompFut {
        let data = self.data.lock().unwrap();
        let start = sectors_to_bytes(lba);
        let len = buf.len();
        buf.copy_from_slice(&data[start..start + len]);
        Box::pin(future::ok(()))
    }

    fn write_at(&self, buf: IoVec, lba: LbaT) -> BoxCompFut {
        let mut data = self.data.lock().unwrap();
        let start = sectors_to_bytes(lba);
        data[start..start + buf.len()].copy_from_slice(&buf[..]);
        Box::pin(future::ok(()))
    }
}

/// A component device that fails every operation
struct FaultyDev {
    size: LbaT,
}

impl ComponentDev for FaultyDev {
    fn size(&self) -> LbaT {
        self.size
    }

    fn read_at(&self, _buf: IoVecMut, _lba: LbaT) -> BoxCompFut {
        Box::pin(future::err(Error::EIO))
    }

    fn write_at(&self, _buf: IoVec, _lba: LbaT) -> BoxCompFut {
        Box::pin(future::err(Error::EIO))
    }
}

fn pool(capacity: usize) -> Arc<RequestPool> {
    Arc::new(RequestPool::with_capacity(capacity))
}

fn random_payload(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut v = vec![0u8; len];
    rng.fill_bytes(&mut v);
    v
}

async fn write_read_back(array: &Array, lba: LbaT, payload: &[u8]) {
    let dbs = DivBufShared::from(payload.to_vec());
    array.write_at(dbs.try_const().unwrap(), lba).unwrap()
        .await
        .unwrap();

    let dbs2 = DivBufShared::from(vec![0u8; payload.len()]);
    array.read_at(dbs2.try_mut().unwrap(), lba).unwrap()
        .await
        .unwrap();
    assert_eq!(&dbs2.try_const().unwrap()[..], payload);
}

mod span {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Write across the component boundary, read it back, and check where
    /// the bytes physically landed.
    #[tokio::test]
    async fn straddle_round_trip() {
        let c0 = Arc::new(RamDev::new(1000));
        let c1 = Arc::new(RamDev::new(1000));
        let array = Array::create(
            Layout::Span,
            vec![
                (1000, c0.clone() as Arc<dyn ComponentDev>),
                (1000, c1.clone() as Arc<dyn ComponentDev>),
            ],
            2000, 0, pool(16)
        ).unwrap();
        assert_eq!(array.size(), 2000);

        let payload = random_payload(1, 2048);
        write_read_back(&array, 999, &payload).await;

        // The first sector lands at the end of component 0, the rest at the
        // start of component 1.
        assert_eq!(c0.sector(999), &payload[0..512]);
        assert_eq!(c1.sector(0), &payload[512..1024]);
        assert_eq!(c1.sector(2), &payload[1536..2048]);
    }

    /// The base offset reserves the front of each component
    #[tokio::test]
    async fn base_offset() {
        let c0 = Arc::new(RamDev::new(1016));
        let array = Array::create(
            Layout::Span,
            vec![(1000, c0.clone() as Arc<dyn ComponentDev>)],
            1000, 16, pool(16)
        ).unwrap();

        let payload = random_payload(2, 512);
        write_read_back(&array, 0, &payload).await;
        assert_eq!(c0.sector(16), &payload[..]);
        assert!(c0.sector(0).iter().all(|b| *b == 0));
    }
}

mod stripe0 {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Whole-array round trip over an even geometry, and a spot check of the
    /// unit addressing.
    #[tokio::test]
    async fn round_trip() {
        let comps = (0..3).map(|_| Arc::new(RamDev::new(8)))
            .collect::<Vec<_>>();
        let array = Array::create(
            Layout::Stripe0 { width: 3, interleave: nonzero!(4u64) },
            comps.iter()
                .map(|c| (8, c.clone() as Arc<dyn ComponentDev>))
                .collect(),
            24, 0, pool(16)
        ).unwrap();

        let payload = random_payload(3, sectors_to_bytes(24));
        write_read_back(&array, 0, &payload).await;

        // Logical sector 10 is unit 2 offset 2, so component 2 sector 2
        assert_eq!(comps[2].sector(2),
                   &payload[sectors_to_bytes(10)..sectors_to_bytes(11)]);
        // Logical sector 13 is unit 3 offset 1, in the second row
        assert_eq!(comps[0].sector(5),
                   &payload[sectors_to_bytes(13)..sectors_to_bytes(14)]);
    }

    /// A geometry with a trailing short stripe
    #[tokio::test]
    async fn tail_round_trip() {
        let c0 = Arc::new(RamDev::new(5));
        let c1 = Arc::new(RamDev::new(5));
        let array = Array::create(
            Layout::Stripe0 { width: 2, interleave: nonzero!(4u64) },
            vec![
                (5, c0.clone() as Arc<dyn ComponentDev>),
                (5, c1.clone() as Arc<dyn ComponentDev>),
            ],
            10, 0, pool(16)
        ).unwrap();
        assert_eq!(array.size(), 10);

        let payload = random_payload(4, sectors_to_bytes(10));
        write_read_back(&array, 0, &payload).await;

        // The two tail sectors land side by side after the whole units
        assert_eq!(c0.sector(4),
                   &payload[sectors_to_bytes(8)..sectors_to_bytes(9)]);
        assert_eq!(c1.sector(4),
                   &payload[sectors_to_bytes(9)..sectors_to_bytes(10)]);
    }
}

mod errors {
    use pretty_assertions::assert_eq;

    use super::*;

    /// A failing component fails the whole logical request, and the pool
    /// records come back so later requests still work.
    #[tokio::test]
    async fn component_failure() {
        let c0 = Arc::new(RamDev::new(1000));
        let array = Array::create(
            Layout::Span,
            vec![
                (1000, c0.clone() as Arc<dyn ComponentDev>),
                (1000, Arc::new(FaultyDev { size: 1000 })),
            ],
            2000, 0, pool(2)
        ).unwrap();

        let dbs = DivBufShared::from(random_payload(5, 1024));
        let r = array.write_at(dbs.try_const().unwrap(), 999).unwrap()
            .await;
        assert_eq!(r, Err(Error::EIO));

        // Records were recycled, so a request confined to the healthy
        // component succeeds.
        let payload = random_payload(6, 1024);
        write_read_back(&array, 0, &payload).await;
    }

    /// Exhausting the request pool fails synchronously, and a smaller
    /// request afterwards still goes through.
    #[tokio::test]
    async fn pool_exhaustion() {
        let comps = (0..5).map(|_| Arc::new(RamDev::new(1)))
            .collect::<Vec<_>>();
        let array = Array::create(
            Layout::Span,
            comps.iter()
                .map(|c| (1, c.clone() as Arc<dyn ComponentDev>))
                .collect(),
            5, 0, pool(3)
        ).unwrap();

        let dbs = DivBufShared::from(random_payload(8, sectors_to_bytes(5)));
        let e = array.write_at(dbs.try_const().unwrap(), 0).err().unwrap();
        assert_eq!(e, Error::ENOMEM);
        // Nothing at all was submitted
        for c in &comps {
            assert!(c.sector(0).iter().all(|b| *b == 0));
        }

        let payload = random_payload(7, sectors_to_bytes(3));
        write_read_back(&array, 1, &payload).await;
    }

    #[tokio::test]
    async fn out_of_range() {
        let array = Array::create(
            Layout::Span,
            vec![(1000, Arc::new(RamDev::new(1000)) as Arc<dyn ComponentDev>)],
            1000, 0, pool(16)
        ).unwrap();

        let dbs = DivBufShared::from(vec![0u8; 1024]);
        let e = array.write_at(dbs.try_const().unwrap(), 999).err().unwrap();
        assert_eq!(e, Error::ERANGE);
    }
}
