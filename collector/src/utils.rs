use rand::RngCore;
use uuid::Uuid;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut ret = [0u8; N];
    rand::thread_rng().fill_bytes(&mut ret);
    ret
}

// thread_rng is a CSPRNG, reseeded from the OS
pub fn uuid_v4() -> Uuid {
    uuid::Builder::from_random_bytes(random_bytes()).into_uuid()
}
