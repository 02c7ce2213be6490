/// Three-generation state storage for explicit finite-difference schemes.
///
/// A scheme computes `u[n+1]` from `u[n]` and `u[n-1]`. The three buffers
/// are fixed arrays addressed through a rotating head index; `advance()`
/// turns the freshly computed generation into `previous` and recycles the
/// oldest buffer as the next `current`.

pub struct Generations<const CAP: usize> {
    bufs: [[f64; CAP]; 3],
    head: usize,
}

impl<const CAP: usize> Generations<CAP> {
    pub fn new() -> Self {
        Self {
            bufs: [[0.0; CAP]; 3],
            head: 0,
        }
    }

    /// Borrow `(current, previous, previous_previous)`.
    ///
    /// `current` holds stale data from three steps ago; a scheme must
    /// overwrite every point it reads back.
    pub fn split(&mut self) -> (&mut [f64; CAP], &[f64; CAP], &[f64; CAP]) {
        let [a, b, c] = &mut self.bufs;
        match self.head {
            0 => (a, &*c, &*b),
            1 => (b, &*a, &*c),
            _ => (c, &*b, &*a),
        }
    }

    pub fn previous(&self) -> &[f64; CAP] {
        &self.bufs[(self.head + 2) % 3]
    }

    pub fn previous_previous(&self) -> &[f64; CAP] {
        &self.bufs[(self.head + 1) % 3]
    }

    /// Set the two history generations (initial conditions).
    ///
    /// Entries from `len` up to capacity are zeroed.
    pub fn set_history(&mut self, previous: &[f64], previous_previous: &[f64]) {
        self.clear();
        let p = (self.head + 2) % 3;
        let pp = (self.head + 1) % 3;
        self.bufs[p][..previous.len()].copy_from_slice(previous);
        self.bufs[pp][..previous_previous.len()].copy_from_slice(previous_previous);
    }

    /// Rotate: current -> previous -> previous_previous -> next current.
    pub fn advance(&mut self) {
        self.head = (self.head + 1) % 3;
    }

    pub fn clear(&mut self) {
        for buf in &mut self.bufs {
            buf.fill(0.0);
        }
        self.head = 0;
    }
}

impl<const CAP: usize> Default for Generations<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_order() {
        let mut g: Generations<2> = Generations::new();
        g.set_history(&[2.0, 2.0], &[1.0, 1.0]);

        {
            let (cur, prev, pp) = g.split();
            assert_eq!(prev, &[2.0, 2.0]);
            assert_eq!(pp, &[1.0, 1.0]);
            cur.fill(3.0);
        }
        g.advance();

        assert_eq!(g.previous(), &[3.0, 3.0]);
        assert_eq!(g.previous_previous(), &[2.0, 2.0]);
        // The recycled buffer is the oldest generation.
        let (cur, _, _) = g.split();
        assert_eq!(cur, &mut [1.0, 1.0]);
    }

    #[test]
    fn test_full_cycle_returns_to_start() {
        let mut g: Generations<1> = Generations::new();
        for step in 1..=6 {
            let (cur, prev, _) = g.split();
            cur[0] = prev[0] + 1.0;
            g.advance();
            assert_eq!(g.previous()[0], step as f64);
        }
    }
}
