use facereg_core::{
    EmbeddingModel, EnrollOutcome, FaceLocator, FacePipeline, PipelineError, RecognitionOutcome,
    RegistrationSession,
};
use image::DynamicImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker thread exited")]
    ChannelClosed,
}

/// Messages sent from the async front end to the worker thread.
enum WorkerRequest {
    Enroll {
        session: RegistrationSession,
        image: DynamicImage,
        reply: oneshot::Sender<Result<EnrollOutcome, PipelineError>>,
    },
    Recognize {
        image: DynamicImage,
        reply: oneshot::Sender<Result<RecognitionOutcome, PipelineError>>,
    },
}

/// Clone-safe handle to the worker thread.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
}

impl WorkerHandle {
    /// Request enrollment of the face in `image` under the session's identity.
    pub async fn enroll(
        &self,
        session: RegistrationSession,
        image: DynamicImage,
    ) -> Result<EnrollOutcome, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Enroll {
                session,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }

    /// Request recognition of the face in `image`.
    pub async fn recognize(&self, image: DynamicImage) -> Result<RecognitionOutcome, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Recognize {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }
}

/// Move the pipeline onto a dedicated OS thread and serve requests until
/// every handle is dropped. Model sessions are only ever touched from
/// that thread.
pub fn spawn_worker<L, M>(mut pipeline: FacePipeline<L, M>) -> Result<WorkerHandle, WorkerError>
where
    L: FaceLocator + Send + 'static,
    M: EmbeddingModel + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<WorkerRequest>(4);

    std::thread::Builder::new()
        .name("facereg-worker".into())
        .spawn(move || {
            tracing::debug!("worker thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    WorkerRequest::Enroll {
                        session,
                        image,
                        reply,
                    } => {
                        let _ = reply.send(pipeline.enroll(&session, &image));
                    }
                    WorkerRequest::Recognize { image, reply } => {
                        let _ = reply.send(pipeline.recognize(&image));
                    }
                }
            }
            tracing::debug!("worker thread exiting");
        })
        .map_err(WorkerError::Spawn)?;

    Ok(WorkerHandle { tx })
}
