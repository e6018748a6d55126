// ============================================================================
// VECTORIZED TAPE AUTODIFF
// Each node = dense row-major matrix. Nodes are appended in evaluation order,
// so walking the tape backwards is a valid topological order.
// ============================================================================

#[inline]
pub(crate) fn vec_add(a: &[f32], b: &[f32]) -> Vec<f32> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
}

#[inline]
pub(crate) fn vec_add_inplace(a: &mut [f32], b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x += y;
    }
}

#[inline]
pub(crate) fn vec_max(a: &[f32]) -> f32 {
    a.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

/// Row-major `out[m,n] = a[m,k] @ b[k,n]`, with optional transposed reads.
fn sgemm(m: usize, k: usize, n: usize, a: &[f32], a_t: bool, b: &[f32], b_t: bool) -> Vec<f32> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    let mut out = vec![0.0f32; m * n];
    // A^T / B^T are read from the stored matrix with swapped strides.
    let (rsa, csa) = if a_t { (1, m as isize) } else { (k as isize, 1) };
    let (rsb, csb) = if b_t { (1, k as isize) } else { (n as isize, 1) };
    // SAFETY: the slices hold exactly m*k, k*n and m*n elements and the
    // strides above stay inside them.
    unsafe {
        matrixmultiply::sgemm(
            m,
            k,
            n,
            1.0,
            a.as_ptr(),
            rsa,
            csa,
            b.as_ptr(),
            rsb,
            csb,
            0.0,
            out.as_mut_ptr(),
            n as isize,
            1,
        );
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TID(usize);

#[derive(Clone, Debug)]
enum TensorOp {
    Leaf,
    MatMul {
        a: TID,
        b: TID,
        m: usize,
        k: usize,
        n: usize,
    },
    Add { a: TID, b: TID },
    RowSlice { a: TID, row: usize, cols: usize },
    Tanh { a: TID },
    SoftmaxCE { logits: TID, target_idx: usize },
    ScalarDiv { a: TID, n: f32 },
}

struct TensorNode {
    data: Vec<f32>,
    grad: Vec<f32>,
    rows: usize,
    cols: usize,
    op: TensorOp,
    is_param: bool,
}

impl TensorNode {
    fn tracks_grad(&self) -> bool {
        self.is_param || !matches!(self.op, TensorOp::Leaf)
    }
}

/// Arena of tensors recorded during one forward pass.
///
/// Cleared and refilled once per window; nothing on it outlives the update.
#[derive(Default)]
pub struct Tape {
    nodes: Vec<TensorNode>,
}

impl Tape {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(1024),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(
        &mut self,
        data: Vec<f32>,
        rows: usize,
        cols: usize,
        op: TensorOp,
        is_param: bool,
    ) -> TID {
        debug_assert_eq!(data.len(), rows * cols);
        let id = self.nodes.len();
        self.nodes.push(TensorNode {
            grad: vec![0.0; data.len()],
            data,
            rows,
            cols,
            op,
            is_param,
        });
        TID(id)
    }

    /// Leaf whose gradient is read back after `backward`.
    pub fn param(&mut self, data: Vec<f32>, rows: usize, cols: usize) -> TID {
        self.push(data, rows, cols, TensorOp::Leaf, true)
    }

    /// Leaf that receives no gradient (inputs, carried-over hidden state).
    pub fn constant(&mut self, data: Vec<f32>, rows: usize, cols: usize) -> TID {
        self.push(data, rows, cols, TensorOp::Leaf, false)
    }

    #[must_use]
    pub fn data(&self, t: TID) -> &[f32] {
        &self.nodes[t.0].data
    }

    #[must_use]
    pub fn grad(&self, t: TID) -> &[f32] {
        &self.nodes[t.0].grad
    }

    #[must_use]
    pub fn shape(&self, t: TID) -> (usize, usize) {
        (self.nodes[t.0].rows, self.nodes[t.0].cols)
    }

    // ------------------------------------------------------------------
    // Forward ops, each records one node
    // ------------------------------------------------------------------

    pub fn matmul(&mut self, a: TID, b: TID) -> TID {
        let (m, k) = self.shape(a);
        let n = self.nodes[b.0].cols;
        debug_assert_eq!(
            k,
            self.nodes[b.0].rows,
            "matmul shape [{},{}] @ [{},{}]",
            m,
            k,
            self.nodes[b.0].rows,
            n
        );
        let out = sgemm(m, k, n, &self.nodes[a.0].data, false, &self.nodes[b.0].data, false);
        self.push(out, m, n, TensorOp::MatMul { a, b, m, k, n }, false)
    }

    pub fn add(&mut self, a: TID, b: TID) -> TID {
        debug_assert_eq!(self.shape(a), self.shape(b));
        let data = vec_add(&self.nodes[a.0].data, &self.nodes[b.0].data);
        let (r, c) = self.shape(a);
        self.push(data, r, c, TensorOp::Add { a, b }, false)
    }

    pub fn row_slice(&mut self, a: TID, row: usize) -> TID {
        let cols = self.nodes[a.0].cols;
        let off = row * cols;
        let data = self.nodes[a.0].data[off..off + cols].to_vec();
        self.push(data, 1, cols, TensorOp::RowSlice { a, row, cols }, false)
    }

    pub fn tanh(&mut self, a: TID) -> TID {
        let data: Vec<f32> = self.nodes[a.0].data.iter().map(|x| x.tanh()).collect();
        let (r, c) = self.shape(a);
        self.push(data, r, c, TensorOp::Tanh { a }, false)
    }

    pub fn scalar_div(&mut self, a: TID, n: f32) -> TID {
        let data: Vec<f32> = self.nodes[a.0].data.iter().map(|x| x / n).collect();
        let (r, c) = self.shape(a);
        self.push(data, r, c, TensorOp::ScalarDiv { a, n }, false)
    }

    /// Fused softmax cross-entropy: [1, vocab] + target -> scalar loss
    pub fn softmax_ce(&mut self, logits: TID, target_idx: usize) -> TID {
        let ld = &self.nodes[logits.0].data;
        debug_assert!(target_idx < ld.len());
        let max_l = vec_max(ld);
        let sum_exp: f32 = ld.iter().map(|&x| (x - max_l).exp()).sum();
        let loss = sum_exp.ln() + max_l - ld[target_idx];
        self.push(vec![loss], 1, 1, TensorOp::SoftmaxCE { logits, target_idx }, false)
    }

    // ------------------------------------------------------------------
    // Backward
    // ------------------------------------------------------------------

    /// Accumulates d`loss`/d(node) into every node recorded before `loss`.
    pub fn backward(&mut self, loss: TID) {
        for node in &mut self.nodes {
            node.grad.fill(0.0);
        }
        self.nodes[loss.0].grad.fill(1.0);

        for i in (0..=loss.0).rev() {
            if self.nodes[i].grad.iter().all(|&g| g == 0.0) {
                continue;
            }

            let op = self.nodes[i].op.clone();
            match op {
                TensorOp::Leaf => {}

                TensorOp::MatMul { a, b, m, k, n } => {
                    let og = self.nodes[i].grad.clone();
                    if self.nodes[a.0].tracks_grad() {
                        // dA = dOut @ B^T
                        let da = sgemm(m, n, k, &og, false, &self.nodes[b.0].data, true);
                        vec_add_inplace(&mut self.nodes[a.0].grad, &da);
                    }
                    if self.nodes[b.0].tracks_grad() {
                        // dB = A^T @ dOut
                        let db = sgemm(k, m, n, &self.nodes[a.0].data, true, &og, false);
                        vec_add_inplace(&mut self.nodes[b.0].grad, &db);
                    }
                }

                TensorOp::Add { a, b } => {
                    let g = self.nodes[i].grad.clone();
                    vec_add_inplace(&mut self.nodes[a.0].grad, &g);
                    vec_add_inplace(&mut self.nodes[b.0].grad, &g);
                }

                TensorOp::RowSlice { a, row, cols } => {
                    let g = self.nodes[i].grad.clone();
                    let off = row * cols;
                    vec_add_inplace(&mut self.nodes[a.0].grad[off..off + cols], &g);
                }

                TensorOp::Tanh { a } => {
                    let g = self.nodes[i].grad.clone();
                    let od = self.nodes[i].data.clone();
                    for (j, (&gv, &t)) in g.iter().zip(od.iter()).enumerate() {
                        self.nodes[a.0].grad[j] += gv * (1.0 - t * t);
                    }
                }

                TensorOp::ScalarDiv { a, n } => {
                    let g = self.nodes[i].grad.clone();
                    for (ag, gv) in self.nodes[a.0].grad.iter_mut().zip(g.iter()) {
                        *ag += gv / n;
                    }
                }

                TensorOp::SoftmaxCE { logits, target_idx } => {
                    let gv = self.nodes[i].grad[0];
                    let ld = self.nodes[logits.0].data.clone();
                    let max_l = vec_max(&ld);
                    let exps: Vec<f32> = ld.iter().map(|&x| (x - max_l).exp()).collect();
                    let sum_e: f32 = exps.iter().sum();
                    for (j, e) in exps.iter().enumerate() {
                        let prob = e / sum_e;
                        let tg = if j == target_idx { prob - 1.0 } else { prob };
                        self.nodes[logits.0].grad[j] += gv * tg;
                    }
                }
            }
        }
    }
}
