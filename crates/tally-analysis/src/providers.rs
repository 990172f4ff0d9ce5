//! Static provider tables.
//!
//! Every SDK the analysis understands is described here: which modules expose
//! it (per language family), the canonical namespace those modules map onto,
//! and the call shapes reachable from that namespace. Detectors never look at
//! module names or SDK classes directly; they ask what [`CallKind`] a resolved
//! call has and read the argument-name tables below.

use std::fmt;

use serde::{Deserialize, Serialize};
use tally_lang::LanguageFamily;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// LLM provider SDKs with a canonical namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    LangChain,
    LiteLlm,
    Ollama,
    Cohere,
    Mistral,
    Groq,
    #[serde(rename = "aws-bedrock")]
    Bedrock,
    Perplexity,
}

impl Provider {
    /// Lowercase provider name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::LangChain => "langchain",
            Self::LiteLlm => "litellm",
            Self::Ollama => "ollama",
            Self::Cohere => "cohere",
            Self::Mistral => "mistral",
            Self::Groq => "groq",
            Self::Bedrock => "aws-bedrock",
            Self::Perplexity => "perplexity",
        }
    }

    /// Conventional environment variable holding the provider's API key.
    #[must_use]
    pub const fn env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::Cohere => Some("CO_API_KEY"),
            Self::Mistral => Some("MISTRAL_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Perplexity => Some("PERPLEXITY_API_KEY"),
            Self::LangChain | Self::LiteLlm | Self::Ollama | Self::Bedrock => None,
        }
    }

    /// `true` when streamed responses omit token usage unless the caller
    /// opts in with `stream_options.include_usage`.
    #[must_use]
    pub const fn stream_usage_is_opt_in(self) -> bool {
        matches!(self, Self::OpenAi | Self::Groq | Self::LiteLlm)
    }

    /// Underlying provider named by a wrapper class such as `ChatOpenAI`.
    #[must_use]
    pub fn from_class_hint(class: &str) -> Option<Self> {
        const HINTS: &[(&str, Provider)] = &[
            ("OpenAI", Provider::OpenAi),
            ("Anthropic", Provider::Anthropic),
            ("Google", Provider::Google),
            ("Gemini", Provider::Google),
            ("VertexAI", Provider::Google),
            ("Mistral", Provider::Mistral),
            ("Cohere", Provider::Cohere),
            ("Groq", Provider::Groq),
            ("Ollama", Provider::Ollama),
            ("Bedrock", Provider::Bedrock),
            ("Perplexity", Provider::Perplexity),
        ];
        HINTS
            .iter()
            .find(|(hint, _)| class.contains(hint))
            .map(|(_, provider)| *provider)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// A module (Python) or package specifier (npm) exposing a provider SDK.
#[derive(Debug, Clone, Copy)]
pub struct ModuleEntry {
    /// Module path or package specifier; a trailing `/` matches every subpath.
    pub module: &'static str,
    /// Language family the module belongs to.
    pub family: LanguageFamily,
    /// Provider the module exposes.
    pub provider: Provider,
    /// Canonical namespace symbols from this module are rooted at.
    pub namespace: &'static str,
    /// Export bound by an ES default import, when it is a class.
    pub default_export: Option<&'static str>,
}

const fn py(module: &'static str, provider: Provider, namespace: &'static str) -> ModuleEntry {
    ModuleEntry {
        module,
        family: LanguageFamily::Python,
        provider,
        namespace,
        default_export: None,
    }
}

const fn npm(
    module: &'static str,
    provider: Provider,
    namespace: &'static str,
    default_export: Option<&'static str>,
) -> ModuleEntry {
    ModuleEntry {
        module,
        family: LanguageFamily::Node,
        provider,
        namespace,
        default_export,
    }
}

const MODULES: &[ModuleEntry] = &[
    py("openai", Provider::OpenAi, "openai"),
    py("anthropic", Provider::Anthropic, "anthropic"),
    py("google.generativeai", Provider::Google, "google.generativeai"),
    py("google.genai", Provider::Google, "google.genai"),
    py("vertexai", Provider::Google, "vertexai"),
    py("langchain", Provider::LangChain, "langchain"),
    py("langchain_core", Provider::LangChain, "langchain"),
    py("langchain_community", Provider::LangChain, "langchain"),
    py("langchain_openai", Provider::LangChain, "langchain"),
    py("langchain_anthropic", Provider::LangChain, "langchain"),
    py("langchain_google_genai", Provider::LangChain, "langchain"),
    py("langchain_google_vertexai", Provider::LangChain, "langchain"),
    py("langchain_mistralai", Provider::LangChain, "langchain"),
    py("langchain_cohere", Provider::LangChain, "langchain"),
    py("langchain_groq", Provider::LangChain, "langchain"),
    py("langchain_ollama", Provider::LangChain, "langchain"),
    py("langchain_aws", Provider::LangChain, "langchain"),
    py("langchain_perplexity", Provider::LangChain, "langchain"),
    py("litellm", Provider::LiteLlm, "litellm"),
    py("ollama", Provider::Ollama, "ollama"),
    py("cohere", Provider::Cohere, "cohere"),
    py("mistralai", Provider::Mistral, "mistralai"),
    py("groq", Provider::Groq, "groq"),
    py("boto3", Provider::Bedrock, "boto3"),
    py("perplexity", Provider::Perplexity, "perplexity"),
    npm("openai", Provider::OpenAi, "openai", Some("OpenAI")),
    npm("@anthropic-ai/sdk", Provider::Anthropic, "anthropic", Some("Anthropic")),
    npm("@google/generative-ai", Provider::Google, "google.generativeai", None),
    npm("@google/genai", Provider::Google, "google.genai", None),
    npm("@google-cloud/vertexai", Provider::Google, "vertexai", None),
    npm("langchain/", Provider::LangChain, "langchain", None),
    npm("@langchain/", Provider::LangChain, "langchain", None),
    npm("ollama", Provider::Ollama, "ollama", None),
    npm("cohere-ai", Provider::Cohere, "cohere", None),
    npm("@mistralai/mistralai", Provider::Mistral, "mistralai", None),
    npm("groq-sdk", Provider::Groq, "groq", Some("Groq")),
    npm("@aws-sdk/client-bedrock-runtime", Provider::Bedrock, "bedrock", None),
    npm("@perplexity-ai/perplexity_ai", Provider::Perplexity, "perplexity", Some("Perplexity")),
];

/// Namespaces of general-purpose cloud SDKs with the client services that
/// reach a model runtime. Calls below such a namespace only count when their
/// client was created for one of these services.
const SERVICE_GATES: &[(&str, &[&str])] = &[("boto3", &["bedrock-runtime", "bedrock-agent-runtime"])];

/// Client factory of a service-gated SDK (`boto3.client("bedrock-runtime")`).
pub const SERVICE_CLIENT_FACTORY: &str = "client";

/// Keyword naming the service of a gated client factory; positionally it is
/// the first argument.
pub const SERVICE_ARGS: &[&str] = &["service_name"];

/// Runtime services reachable through `namespace`, when it is service-gated.
#[must_use]
pub fn service_gate(namespace: &str) -> Option<&'static [&'static str]> {
    SERVICE_GATES
        .iter()
        .find(|(gated, _)| *gated == namespace)
        .map(|(_, services)| *services)
}

/// A module resolved against the provider table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMatch {
    /// Matched provider.
    pub provider: Provider,
    /// Canonical namespace.
    pub namespace: &'static str,
    /// Export bound by an ES default import.
    pub default_export: Option<&'static str>,
    /// Dotted segments below the matched Python module.
    pub rest: Vec<String>,
}

impl ModuleMatch {
    fn of(entry: &ModuleEntry, rest: Vec<String>) -> Self {
        Self {
            provider: entry.provider,
            namespace: entry.namespace,
            default_export: entry.default_export,
            rest,
        }
    }
}

/// Resolves a module as written in an import.
///
/// Python modules match on the longest dotted prefix
/// (`langchain_openai.chat_models` resolves through `langchain_openai`);
/// npm specifiers match exactly or by subpath.
#[must_use]
pub fn lookup_module(module: &str, family: LanguageFamily) -> Option<ModuleMatch> {
    match family {
        LanguageFamily::Python => {
            let segments: Vec<&str> = module.split('.').collect();
            (1..=segments.len()).rev().find_map(|n| {
                let prefix = segments[..n].join(".");
                MODULES
                    .iter()
                    .filter(|e| e.family == family)
                    .find(|e| e.module == prefix)
                    .map(|e| ModuleMatch::of(e, segments[n..].iter().map(|s| (*s).to_string()).collect()))
            })
        }
        LanguageFamily::Node => MODULES
            .iter()
            .filter(|e| e.family == family)
            .filter(|e| {
                if e.module.ends_with('/') {
                    module.starts_with(e.module) || module == e.module.trim_end_matches('/')
                } else {
                    module == e.module || module.starts_with(&format!("{}/", e.module))
                }
            })
            .max_by_key(|e| e.module.len())
            .map(|e| ModuleMatch::of(e, Vec::new())),
    }
}

/// `true` if `prefix` is a known Python module or a package containing one
/// (`google` for `google.generativeai`).
#[must_use]
pub fn is_known_package(prefix: &str, family: LanguageFamily) -> bool {
    MODULES.iter().filter(|e| e.family == family).any(|e| {
        e.module == prefix
            || e.module
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// The first module that exposes `namespace` in `family`.
#[must_use]
pub fn namespace_module(namespace: &str, family: LanguageFamily) -> Option<&'static ModuleEntry> {
    MODULES
        .iter()
        .find(|e| e.family == family && e.namespace == namespace && !e.module.ends_with('/'))
}

// ---------------------------------------------------------------------------
// Call shapes
// ---------------------------------------------------------------------------

/// What a resolved call does, as far as cost and credential analysis cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Builds a client object.
    Constructor,
    /// Builds a chat-model object that carries model and token settings.
    ChatModel,
    /// Builds a model handle whose settings apply to later completions.
    ModelFactory,
    /// Requests a completion.
    Completion,
    /// Requests embeddings.
    Embedding,
    /// Requests image generation.
    Image,
    /// Invokes a chat-model object.
    Invocation,
    /// Configures the SDK globally.
    Configure,
    /// Any other provider call.
    Other,
}

impl CallKind {
    /// `true` for calls that send a billable request.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::Completion | Self::Embedding | Self::Image | Self::Invocation)
    }

    /// `true` for calls that produce a reusable object.
    #[must_use]
    pub const fn creates_instance(self) -> bool {
        !self.is_request()
    }
}

/// A call shape reachable from a provider namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallShape {
    /// Providers the shape applies to.
    pub providers: &'static [Provider],
    /// Trailing segments of the canonical path.
    pub tail: &'static [&'static str],
    /// Call kind.
    pub kind: CallKind,
    /// Batch-capable alternative, when one exists.
    pub batch: Option<&'static str>,
    /// The call streams its response.
    pub streams: bool,
    /// Positional index of the model argument.
    pub model_slot: Option<usize>,
    /// Positional index of the credential argument.
    pub credential_slot: Option<usize>,
}

const fn shape(providers: &'static [Provider], tail: &'static [&'static str], kind: CallKind) -> CallShape {
    CallShape {
        providers,
        tail,
        kind,
        batch: None,
        streams: false,
        model_slot: None,
        credential_slot: None,
    }
}

const fn batched(
    providers: &'static [Provider],
    tail: &'static [&'static str],
    kind: CallKind,
    batch: &'static str,
) -> CallShape {
    CallShape {
        batch: Some(batch),
        ..shape(providers, tail, kind)
    }
}

const fn streaming(providers: &'static [Provider], tail: &'static [&'static str]) -> CallShape {
    CallShape {
        streams: true,
        ..shape(providers, tail, CallKind::Completion)
    }
}

const fn with_slots(base: CallShape, model_slot: Option<usize>, credential_slot: Option<usize>) -> CallShape {
    CallShape {
        model_slot,
        credential_slot,
        ..base
    }
}

use CallKind::{ChatModel, Completion, Configure, Constructor, Embedding, Image, Invocation, ModelFactory};
use Provider::{Anthropic, Bedrock, Cohere, Google, Groq, LangChain, LiteLlm, Mistral, OpenAi, Ollama, Perplexity};

/// Ordered most specific first; the first matching shape wins.
const SHAPES: &[CallShape] = &[
    // -- Constructors --
    shape(&[OpenAi], &["OpenAI"], Constructor),
    shape(&[OpenAi], &["AsyncOpenAI"], Constructor),
    shape(&[OpenAi], &["AzureOpenAI"], Constructor),
    shape(&[OpenAi], &["AsyncAzureOpenAI"], Constructor),
    shape(&[Anthropic], &["Anthropic"], Constructor),
    shape(&[Anthropic], &["AsyncAnthropic"], Constructor),
    shape(&[Anthropic], &["AnthropicBedrock"], Constructor),
    shape(&[Anthropic], &["AnthropicVertex"], Constructor),
    with_slots(shape(&[Google], &["GenerativeModel"], ModelFactory), Some(0), None),
    shape(&[Google], &["getGenerativeModel"], ModelFactory),
    with_slots(shape(&[Google], &["GoogleGenerativeAI"], Constructor), None, Some(0)),
    shape(&[Google], &["GoogleGenAI"], Constructor),
    shape(&[Google], &["VertexAI"], Constructor),
    shape(&[Google], &["Client"], Constructor),
    shape(&[Google], &["configure"], Configure),
    shape(&[Google], &["init"], Configure),
    shape(&[LangChain], &["ChatOpenAI"], ChatModel),
    shape(&[LangChain], &["AzureChatOpenAI"], ChatModel),
    shape(&[LangChain], &["ChatAnthropic"], ChatModel),
    shape(&[LangChain], &["ChatGoogleGenerativeAI"], ChatModel),
    shape(&[LangChain], &["ChatVertexAI"], ChatModel),
    shape(&[LangChain], &["ChatOllama"], ChatModel),
    shape(&[LangChain], &["ChatMistralAI"], ChatModel),
    shape(&[LangChain], &["ChatCohere"], ChatModel),
    shape(&[LangChain], &["ChatGroq"], ChatModel),
    shape(&[LangChain], &["ChatLiteLLM"], ChatModel),
    shape(&[LangChain], &["OpenAI"], ChatModel),
    shape(&[LangChain], &["OpenAIEmbeddings"], Constructor),
    shape(&[LangChain], &["AzureOpenAIEmbeddings"], Constructor),
    shape(&[LangChain], &["GoogleGenerativeAIEmbeddings"], Constructor),
    shape(&[LangChain], &["VertexAIEmbeddings"], Constructor),
    shape(&[LangChain], &["OllamaEmbeddings"], Constructor),
    shape(&[LangChain], &["CohereEmbeddings"], Constructor),
    shape(&[LangChain], &["MistralAIEmbeddings"], Constructor),
    shape(&[Ollama], &["Client"], Constructor),
    shape(&[Ollama], &["AsyncClient"], Constructor),
    shape(&[Ollama], &["Ollama"], Constructor),
    with_slots(shape(&[Cohere], &["Client"], Constructor), None, Some(0)),
    with_slots(shape(&[Cohere], &["ClientV2"], Constructor), None, Some(0)),
    shape(&[Cohere], &["AsyncClient"], Constructor),
    shape(&[Cohere], &["CohereClient"], Constructor),
    shape(&[Cohere], &["CohereClientV2"], Constructor),
    shape(&[Mistral], &["Mistral"], Constructor),
    shape(&[Mistral], &["MistralClient"], Constructor),
    shape(&[Groq], &["Groq"], Constructor),
    shape(&[Groq], &["AsyncGroq"], Constructor),
    shape(&[Perplexity], &["Perplexity"], Constructor),
    shape(&[Perplexity], &["AsyncPerplexity"], Constructor),
    shape(&[Bedrock], &["client"], Constructor),
    shape(&[Bedrock], &["BedrockRuntimeClient"], Constructor),
    shape(&[LangChain], &["ChatBedrock"], ChatModel),
    shape(&[LangChain], &["ChatBedrockConverse"], ChatModel),
    shape(&[LangChain], &["ChatPerplexity"], ChatModel),
    shape(&[LangChain], &["BedrockEmbeddings"], Constructor),
    // -- Completions --
    streaming(&[OpenAi, Groq], &["chat", "completions", "stream"]),
    shape(&[OpenAi, Groq, Perplexity], &["chat", "completions", "create"], Completion),
    shape(&[OpenAi], &["completions", "parse"], Completion),
    shape(&[OpenAi], &["ChatCompletion", "create"], Completion),
    shape(&[OpenAi], &["ChatCompletion", "acreate"], Completion),
    batched(&[OpenAi], &["Completion", "create"], Completion, "a list `prompt` in one request"),
    batched(&[OpenAi], &["completions", "create"], Completion, "a list `prompt` in one request"),
    shape(&[OpenAi], &["responses", "create"], Completion),
    shape(&[OpenAi], &["createChatCompletion"], Completion),
    batched(&[OpenAi], &["createCompletion"], Completion, "a list `prompt` in one request"),
    batched(&[Anthropic], &["messages", "create"], Completion, "`messages.batches.create`"),
    streaming(&[Anthropic], &["messages", "stream"]),
    shape(&[Anthropic], &["completions", "create"], Completion),
    shape(&[Google], &["generate_content"], Completion),
    shape(&[Google], &["generate_content_async"], Completion),
    streaming(&[Google], &["generate_content_stream"]),
    shape(&[Google], &["generateContent"], Completion),
    streaming(&[Google], &["generateContentStream"]),
    shape(&[Google], &["send_message"], Completion),
    shape(&[Google], &["sendMessage"], Completion),
    streaming(&[Google], &["sendMessageStream"]),
    batched(&[LiteLlm], &["completion"], Completion, "`litellm.batch_completion`"),
    batched(&[LiteLlm], &["acompletion"], Completion, "`litellm.batch_completion`"),
    shape(&[LiteLlm], &["text_completion"], Completion),
    shape(&[Ollama], &["chat"], Completion),
    shape(&[Ollama], &["generate"], Completion),
    shape(&[Mistral], &["chat", "complete"], Completion),
    shape(&[Mistral], &["chat", "complete_async"], Completion),
    streaming(&[Mistral], &["chat", "stream"]),
    streaming(&[Cohere], &["chat_stream"]),
    shape(&[Cohere], &["chat"], Completion),
    shape(&[Cohere], &["generate"], Completion),
    shape(&[Bedrock], &["invoke_model"], Completion),
    streaming(&[Bedrock], &["invoke_model_with_response_stream"]),
    shape(&[Bedrock], &["converse"], Completion),
    streaming(&[Bedrock], &["converse_stream"]),
    shape(&[Bedrock], &["retrieve_and_generate"], Completion),
    shape(&[Bedrock], &["invoke_agent"], Completion),
    // The Node SDK sends command objects; the command carries the request.
    shape(&[Bedrock], &["InvokeModelCommand"], Completion),
    streaming(&[Bedrock], &["InvokeModelWithResponseStreamCommand"]),
    shape(&[Bedrock], &["ConverseCommand"], Completion),
    streaming(&[Bedrock], &["ConverseStreamCommand"]),
    // -- Embeddings --
    batched(&[OpenAi, Mistral, Groq], &["embeddings", "create"], Embedding, "one request with the whole list as `input`"),
    batched(&[Google], &["embed_content"], Embedding, "one `embed_content` call with a list of contents"),
    batched(&[Google], &["embedContent"], Embedding, "`batchEmbedContents`"),
    shape(&[Google], &["batchEmbedContents"], Embedding),
    batched(&[LiteLlm], &["embedding"], Embedding, "one request with the whole list as `input`"),
    batched(&[LiteLlm], &["aembedding"], Embedding, "one request with the whole list as `input`"),
    batched(&[Ollama], &["embeddings"], Embedding, "`embed` with a list `input`"),
    batched(&[Ollama], &["embed"], Embedding, "one `embed` call with a list `input`"),
    batched(&[Cohere], &["embed"], Embedding, "one `embed` call with every text in `texts`"),
    batched(&[LangChain], &["embed_query"], Embedding, "`embed_documents`"),
    batched(&[LangChain], &["aembed_query"], Embedding, "`aembed_documents`"),
    batched(&[LangChain], &["embedQuery"], Embedding, "`embedDocuments`"),
    shape(&[LangChain], &["embed_documents"], Embedding),
    shape(&[LangChain], &["embedDocuments"], Embedding),
    // -- Images --
    shape(&[OpenAi], &["images", "generate"], Image),
    shape(&[OpenAi], &["images", "edit"], Image),
    shape(&[OpenAi], &["images", "create_variation"], Image),
    shape(&[LiteLlm], &["image_generation"], Image),
    // -- Chat-model invocations --
    batched(&[LangChain], &["invoke"], Invocation, "`batch`"),
    batched(&[LangChain], &["ainvoke"], Invocation, "`abatch`"),
    batched(&[LangChain], &["predict"], Invocation, "`batch`"),
    CallShape {
        streams: true,
        ..shape(&[LangChain], &["stream"], Invocation)
    },
    CallShape {
        streams: true,
        ..shape(&[LangChain], &["astream"], Invocation)
    },
    shape(&[LangChain], &["batch"], Invocation),
    shape(&[LangChain], &["abatch"], Invocation),
];

/// Finds the shape for `segments` (canonical path below the namespace).
#[must_use]
pub fn match_shape(provider: Provider, segments: &[String]) -> Option<&'static CallShape> {
    SHAPES.iter().find(|shape| shape.matches(provider, segments))
}

/// Like [`match_shape`] for a method reached through an instance, where
/// constructor shapes never apply.
#[must_use]
pub fn match_method_shape(provider: Provider, segments: &[String]) -> Option<&'static CallShape> {
    SHAPES
        .iter()
        .filter(|shape| !matches!(shape.kind, CallKind::Constructor | CallKind::ChatModel))
        .find(|shape| shape.matches(provider, segments))
}

impl CallShape {
    fn matches(&self, provider: Provider, segments: &[String]) -> bool {
        self.providers.contains(&provider)
            && segments.len() >= self.tail.len()
            && segments[segments.len() - self.tail.len()..]
                .iter()
                .zip(self.tail)
                .all(|(seg, tail)| seg == tail)
    }
}

// ---------------------------------------------------------------------------
// Argument names
// ---------------------------------------------------------------------------

/// Keyword arguments that cap generated tokens.
pub const TOKEN_LIMIT_ARGS: &[&str] = &[
    "max_tokens",
    "max_completion_tokens",
    "max_output_tokens",
    "max_tokens_to_sample",
    "max_new_tokens",
    "num_predict",
    "maxTokens",
    "maxOutputTokens",
    "maxCompletionTokens",
    "maxTokenCount",
    "max_gen_len",
];

/// Keyword arguments that nest generation settings one level down.
pub const SETTINGS_CONTAINERS: &[&str] = &[
    "generation_config",
    "generationConfig",
    "config",
    "options",
    "model_kwargs",
    "modelKwargs",
    "extra_body",
    "body",
    "inferenceConfig",
    "textGenerationConfig",
];

/// Keyword arguments naming the model.
pub const MODEL_ARGS: &[&str] = &["model", "model_name", "modelName", "model_id", "modelId"];

/// Keyword arguments (and object keys) that carry an API credential.
pub const CREDENTIAL_ARGS: &[&str] = &[
    "api_key",
    "apiKey",
    "openai_api_key",
    "anthropic_api_key",
    "google_api_key",
    "cohere_api_key",
    "mistral_api_key",
    "groq_api_key",
    "pplx_api_key",
    "perplexity_api_key",
    "aws_access_key_id",
    "aws_secret_access_key",
    "aws_session_token",
    "openAIApiKey",
    "anthropicApiKey",
    "api_token",
    "auth_token",
];

/// Assignment attributes that configure a credential module-wide
/// (`openai.api_key = ...`).
pub const CREDENTIAL_ATTRIBUTES: &[&str] = &["api_key", "apiKey"];

/// Keyword arguments (and object keys) naming a client's API endpoint.
pub const ENDPOINT_ARGS: &[&str] = &["base_url", "baseURL", "api_base"];

/// Hosts of OpenAI-compatible APIs run by another provider.
const COMPATIBLE_ENDPOINTS: &[(&str, Provider)] = &[
    ("api.perplexity.ai", Provider::Perplexity),
    ("api.groq.com", Provider::Groq),
    ("api.mistral.ai", Provider::Mistral),
];

/// Provider serving the OpenAI-compatible endpoint `url`.
#[must_use]
pub fn endpoint_provider(url: &str) -> Option<Provider> {
    let host = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or_default();
    COMPATIBLE_ENDPOINTS
        .iter()
        .find(|(known, _)| host == *known)
        .map(|(_, provider)| *provider)
}

/// `true` if `name` is a credential parameter.
#[must_use]
pub fn is_credential_arg(name: &str) -> bool {
    CREDENTIAL_ARGS.contains(&name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| (*s).to_string()).collect()
    }

    // -- Modules -----------------------------------------------------------

    #[test]
    fn python_modules_match_longest_prefix() {
        let m = lookup_module("langchain_openai.chat_models", LanguageFamily::Python).unwrap();
        assert_eq!(m.provider, Provider::LangChain);
        assert_eq!(m.namespace, "langchain");
        assert_eq!(m.rest, ["chat_models"]);

        let m = lookup_module("google.generativeai", LanguageFamily::Python).unwrap();
        assert_eq!(m.namespace, "google.generativeai");
        assert!(lookup_module("google", LanguageFamily::Python).is_none());
        assert!(lookup_module("requests", LanguageFamily::Python).is_none());
    }

    #[test]
    fn npm_specifiers_match_exactly_or_by_subpath() {
        let m = lookup_module("@anthropic-ai/sdk", LanguageFamily::Node).unwrap();
        assert_eq!(m.default_export, Some("Anthropic"));
        let m = lookup_module("@langchain/openai", LanguageFamily::Node).unwrap();
        assert_eq!(m.provider, Provider::LangChain);
        assert!(lookup_module("openai/resources", LanguageFamily::Node).is_some());
        assert!(lookup_module("openai-edge-proxy", LanguageFamily::Node).is_none());
        assert!(lookup_module("anthropic", LanguageFamily::Node).is_none());
    }

    // -- Shapes ------------------------------------------------------------

    #[test]
    fn chat_completion_beats_legacy_completion() {
        let shape = match_shape(Provider::OpenAi, &segs(&["OpenAI", "chat", "completions", "create"])).unwrap();
        assert_eq!(shape.kind, CallKind::Completion);
        assert!(shape.batch.is_none());
        let legacy = match_shape(Provider::OpenAi, &segs(&["OpenAI", "completions", "create"])).unwrap();
        assert!(legacy.batch.is_some());
    }

    #[test]
    fn shapes_are_provider_scoped() {
        let chat = segs(&["Client", "chat"]);
        assert_eq!(match_shape(Provider::Ollama, &chat).unwrap().kind, CallKind::Completion);
        assert!(match_shape(Provider::OpenAi, &chat).is_none());
        let client = segs(&["Client"]);
        assert_eq!(match_shape(Provider::Cohere, &client).unwrap().credential_slot, Some(0));
        assert_eq!(match_shape(Provider::Ollama, &client).unwrap().credential_slot, None);
    }

    #[test]
    fn embedding_shapes_name_batch_overload() {
        let shape = match_shape(Provider::LangChain, &segs(&["OpenAIEmbeddings", "embed_query"])).unwrap();
        assert_eq!(shape.kind, CallKind::Embedding);
        assert_eq!(shape.batch, Some("`embed_documents`"));
    }

    #[test]
    fn methods_never_match_constructors() {
        let segments = segs(&["OpenAIEmbeddings", "OpenAI"]);
        assert_eq!(match_shape(Provider::LangChain, &segments).unwrap().kind, CallKind::ChatModel);
        assert!(match_method_shape(Provider::LangChain, &segments).is_none());
    }

    #[test]
    fn namespace_modules_per_family() {
        assert_eq!(namespace_module("anthropic", LanguageFamily::Node).unwrap().module, "@anthropic-ai/sdk");
        assert_eq!(namespace_module("google.genai", LanguageFamily::Python).unwrap().module, "google.genai");
        assert!(namespace_module("langchain", LanguageFamily::Node).is_none());
    }

    #[test]
    fn request_kinds() {
        assert!(CallKind::Completion.is_request());
        assert!(CallKind::Invocation.is_request());
        assert!(CallKind::ModelFactory.creates_instance());
        assert!(!CallKind::Embedding.creates_instance());
    }

    #[test]
    fn bedrock_shapes_and_service_gate() {
        let m = lookup_module("boto3", LanguageFamily::Python).unwrap();
        assert_eq!(m.provider, Provider::Bedrock);
        assert_eq!(service_gate(m.namespace), Some(&["bedrock-runtime", "bedrock-agent-runtime"][..]));
        assert_eq!(match_shape(Provider::Bedrock, &segs(&["client"])).unwrap().kind, CallKind::Constructor);
        let converse = match_method_shape(Provider::Bedrock, &segs(&["client", "converse"])).unwrap();
        assert_eq!(converse.kind, CallKind::Completion);
        assert!(match_method_shape(Provider::Bedrock, &segs(&["client", "converse_stream"])).unwrap().streams);
        assert!(match_method_shape(Provider::Bedrock, &segs(&["client", "put_object"])).is_none());

        let m = lookup_module("@aws-sdk/client-bedrock-runtime", LanguageFamily::Node).unwrap();
        assert!(service_gate(m.namespace).is_none(), "the npm client only talks to bedrock");
        assert_eq!(match_shape(Provider::Bedrock, &segs(&["ConverseCommand"])).unwrap().kind, CallKind::Completion);
        assert_eq!(Provider::Bedrock.to_string(), "aws-bedrock");
    }

    #[test]
    fn compatible_endpoints() {
        assert_eq!(endpoint_provider("https://api.perplexity.ai"), Some(Provider::Perplexity));
        assert_eq!(endpoint_provider("https://api.groq.com/openai/v1"), Some(Provider::Groq));
        assert_eq!(endpoint_provider("api.perplexity.ai:443/v1"), Some(Provider::Perplexity));
        assert_eq!(endpoint_provider("https://api.perplexity.ai.example.com"), None);
        assert_eq!(endpoint_provider("http://localhost:8000/v1"), None);
    }

    #[test]
    fn class_hints() {
        assert_eq!(Provider::from_class_hint("ChatOpenAI"), Some(Provider::OpenAi));
        assert_eq!(Provider::from_class_hint("ChatGoogleGenerativeAI"), Some(Provider::Google));
        assert_eq!(Provider::from_class_hint("ChatBedrockConverse"), Some(Provider::Bedrock));
        assert_eq!(Provider::from_class_hint("Something"), None);
    }
}
