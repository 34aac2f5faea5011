//! Per-row Adam updates for matrix factorization.
//!
//! Moments are divided by the constant `1 - beta` rather than the
//! step-dependent `1 - beta^t`, so rows that are rarely visited are not
//! treated as fresh on every visit.
use ndarray::{ArrayView1, ArrayViewMut1, Zip};

/// Adam hyperparameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Adam {
    /// Step size.
    pub learning_rate: f32,
    /// Decay of the first moment.
    pub beta1: f32,
    /// Decay of the second moment.
    pub beta2: f32,
    /// Denominator offset.
    pub eps: f32,
}

impl Default for Adam {
    fn default() -> Self {
        Adam {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Adam {
    /// Adam with the given step size and default decays.
    pub fn new(learning_rate: f32) -> Self {
        Adam {
            learning_rate,
            ..Adam::default()
        }
    }

    /// Update the moments of one row with `grad` and take a descent step on it.
    pub fn update(
        &self,
        param: ArrayViewMut1<f32>,
        first: ArrayViewMut1<f32>,
        second: ArrayViewMut1<f32>,
        grad: ArrayView1<f32>,
    ) {
        let (beta1, beta2) = (self.beta1, self.beta2);
        let (learning_rate, eps) = (self.learning_rate, self.eps);

        Zip::from(param)
            .and(first)
            .and(second)
            .and(grad)
            .for_each(|param, first, second, &grad| {
                *first = beta1 * *first + (1.0 - beta1) * grad;
                *second = beta2 * *second + (1.0 - beta2) * grad * grad;

                let first_hat = *first / (1.0 - beta1);
                let second_hat = *second / (1.0 - beta2);

                *param -= learning_rate * first_hat / (second_hat.sqrt() + eps);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{arr1, Array1};

    #[test]
    fn first_step_matches_sign_step() {
        let adam = Adam::new(0.01);
        let mut param = Array1::<f32>::zeros(2);
        let mut first = Array1::zeros(2);
        let mut second = Array1::zeros(2);
        let grad = arr1(&[-4.0f32, 0.25]);

        adam.update(
            param.view_mut(),
            first.view_mut(),
            second.view_mut(),
            grad.view(),
        );

        assert_relative_eq!(param[0], 0.01, max_relative = 1e-4);
        assert_relative_eq!(param[1], -0.01, max_relative = 1e-4);
        assert_relative_eq!(first[0], -0.4, max_relative = 1e-5);
        assert_relative_eq!(second[1], 0.001 * 0.0625, max_relative = 1e-4);
    }

    #[test]
    fn minimises_a_quadratic() {
        let adam = Adam::new(0.005);
        let target = arr1(&[3.0f32, -1.0, 0.5]);
        let mut param = Array1::<f32>::zeros(3);
        let mut first = Array1::zeros(3);
        let mut second = Array1::zeros(3);

        for _ in 0..6000 {
            let grad = (&param - &target) * 2.0;
            adam.update(
                param.view_mut(),
                first.view_mut(),
                second.view_mut(),
                grad.view(),
            );
        }

        for (&p, &t) in param.iter().zip(target.iter()) {
            assert_abs_diff_eq!(p, t, epsilon = 2e-2);
        }
    }
}
